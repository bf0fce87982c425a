//! Symbol normalization
//!
//! Maps each venue's trading-symbol spelling onto a canonical `CurrencyPair`.
//! Every rule here is a pure function of `(venue, raw)`.

use crate::error::NormalizationError;
use crate::types::{CurrencyPair, Venue, USD};

/// Fiat and stablecoin quotes, longest first, ties alphabetical
const FIAT_AND_STABLE: &[&str] = &[
    "TRIBE", //
    "BIDR", "BUSD", "EURS", "FRAX", "GUSD", "IDRT", "LUSD", "TUSD", "USDC", "USDD", "USDJ", "USDP",
    "USDT", "USDX", "USTC", //
    "AUD", "BRL", "CHF", "CNH", "CNY", "DAI", "EUR", "FEI", "GBP", "INR", "JPY", "KRW", "MXN",
    "NGN", "NZD", "PLN", "RON", "RUB", "SEK", "TRY", "UAH", "USD", "ZAR",
];

/// Same as `FIAT_AND_STABLE` plus Bitfinex's legacy `UST` tether code
const BITFINEX_QUOTES: &[&str] = &[
    "TRIBE", //
    "BIDR", "BUSD", "EURS", "FRAX", "GUSD", "IDRT", "LUSD", "TUSD", "USDC", "USDD", "USDJ", "USDP",
    "USDT", "USDX", "USTC", //
    "AUD", "BRL", "CHF", "CNH", "CNY", "DAI", "EUR", "FEI", "GBP", "INR", "JPY", "KRW", "MXN",
    "NGN", "NZD", "PLN", "RON", "RUB", "SEK", "TRY", "UAH", "USD", "UST", "ZAR",
];

const BYBIT_QUOTES: &[&str] = &["USDC", "USDT", "USD"];

/// Huobi quotes, longest first, ties alphabetical
const HUOBI_QUOTES: &[&str] = &[
    "EUROC", //
    "HUSD", "TUSD", "USDC", "USDD", "USDT", "USTC", //
    "BRL", "BTC", "ETH", "EUR", "GBP", "RUB", "TRX", "TRY", "UAH", "UST", //
    "HT",
];

/// Bitstamp quotes that are four letters long; every other quote is three
const BITSTAMP_LONG_QUOTES: &[&str] = &["USDC", "USDT"];

const BITFINEX_ALIASES: &[(&str, &str)] = &[("UST", "USDT")];

const KRAKEN_ALIASES: &[(&str, &str)] = &[("XBT", "BTC"), ("XDG", "DOGE")];

const KUCOIN_ALIASES: &[(&str, &str)] = &[
    ("XBT", "BTC"),
    ("BCHSV", "BSV"),
    ("WAX", "WAXP"),
    ("GALAX", "GALA"),
];

/// CoinGecko coin ids; every entry is quoted in USD
const COINGECKO_IDS: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("binancecoin", "BNB"),
    ("tether", "USDT"),
    ("usd-coin", "USDC"),
    ("binance-usd", "BUSD"),
    ("dai", "DAI"),
    ("okb", "OKB"),
    ("solana", "SOL"),
    ("cosmos", "ATOM"),
    ("terra-luna-2", "LUNA"),
    ("terra-luna", "LUNC"),
    ("terrausd", "USTC"),
    ("injective-protocol", "INJ"),
    ("eris-amplified-whale", "AMPWHALE"),
    ("backbone-labs-staked-whale", "BWHALE"),
    ("secret", "SCRT"),
    ("juno-network", "JUNO"),
    ("stargaze", "STARS"),
    ("akash-network", "AKT"),
    ("lion-dao", "ROAR"),
    ("white-whale", "WHALE"),
    ("switcheo", "SWTH"),
    ("stride-staked-luna", "STLUNA"),
    ("stafi-staked-swth", "RSWTH"),
    ("osmosis", "OSMO"),
];

/// Map a raw venue symbol to its canonical pair
pub fn normalize(venue: Venue, raw: &str) -> Result<CurrencyPair, NormalizationError> {
    let err = |reason| NormalizationError::new(venue, raw, reason);
    match venue {
        Venue::Binance => suffix_match(raw, FIAT_AND_STABLE).ok_or_else(|| err("no known quote suffix")),
        Venue::Bybit => suffix_match(raw, BYBIT_QUOTES).ok_or_else(|| err("no known quote suffix")),
        Venue::Bitstamp => bitstamp_split(raw).ok_or_else(|| err("symbol too short for a quote")),
        Venue::Huobi => suffix_match(raw, HUOBI_QUOTES).ok_or_else(|| err("no known quote suffix")),
        Venue::Bitfinex => {
            let trimmed = raw.strip_prefix('t').unwrap_or(raw);
            let pair = if trimmed.contains(':') {
                split_on(trimmed, ':').ok_or_else(|| err("expected BASE:QUOTE"))?
            } else {
                suffix_match(trimmed, BITFINEX_QUOTES).ok_or_else(|| err("no known quote suffix"))?
            };
            Ok(alias_pair(pair, BITFINEX_ALIASES))
        }
        Venue::Kraken => {
            let pair = split_on(raw, '/').ok_or_else(|| err("expected BASE/QUOTE"))?;
            let pair = CurrencyPair::new(strip_kraken_prefix(&pair.base), strip_kraken_prefix(&pair.quote));
            Ok(alias_pair(pair, KRAKEN_ALIASES))
        }
        Venue::Kucoin => {
            let pair = split_on(raw, '-').ok_or_else(|| err("expected BASE-QUOTE"))?;
            Ok(alias_pair(pair, KUCOIN_ALIASES))
        }
        Venue::Coingecko => {
            let id = raw.trim().to_lowercase();
            COINGECKO_IDS
                .iter()
                .find(|(k, _)| *k == id)
                .map(|(_, base)| CurrencyPair::new(*base, USD))
                .ok_or_else(|| err("unmapped coin id"))
        }
        Venue::Okx | Venue::Coinbase | Venue::Bittrex | Venue::Fer | Venue::Osmosis => {
            split_default(raw).ok_or_else(|| err("expected two tokens separated by '/', '-' or '_'"))
        }
    }
}

/// Split on exactly one separator into two non-empty tokens
pub fn split_on(raw: &str, sep: char) -> Option<CurrencyPair> {
    let mut parts = raw.split(sep);
    let base = parts.next()?.trim();
    let quote = parts.next()?.trim();
    if parts.next().is_some() || base.is_empty() || quote.is_empty() {
        return None;
    }
    Some(CurrencyPair::new(base, quote))
}

/// First separator present among `/`, `-`, `_` decides the split
fn split_default(raw: &str) -> Option<CurrencyPair> {
    ['/', '-', '_']
        .into_iter()
        .find(|sep| raw.contains(*sep))
        .and_then(|sep| split_on(raw, sep))
}

/// First allowlisted quote that is a suffix of the symbol wins
fn suffix_match(raw: &str, quotes: &[&str]) -> Option<CurrencyPair> {
    let upper = raw.trim().to_uppercase();
    quotes.iter().find_map(|quote| {
        let base = upper.strip_suffix(quote)?;
        (!base.is_empty()).then(|| CurrencyPair::new(base, *quote))
    })
}

/// Bitstamp symbols are `<base><quote>` with a three-letter quote, except
/// the stablecoins listed in `BITSTAMP_LONG_QUOTES`
fn bitstamp_split(raw: &str) -> Option<CurrencyPair> {
    let upper = raw.trim().to_uppercase();
    if !upper.is_ascii() {
        return None;
    }
    let quote_len = if BITSTAMP_LONG_QUOTES.iter().any(|q| upper.ends_with(q)) {
        4
    } else {
        3
    };
    if upper.len() <= quote_len {
        return None;
    }
    let (base, quote) = upper.split_at(upper.len() - quote_len);
    Some(CurrencyPair::new(base, quote))
}

fn strip_kraken_prefix(code: &str) -> &str {
    if code.len() > 3 && (code.starts_with('X') || code.starts_with('Z')) {
        &code[1..]
    } else {
        code
    }
}

fn alias(code: &str, table: &[(&str, &str)]) -> String {
    table
        .iter()
        .find(|(from, _)| *from == code)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| code.to_string())
}

fn alias_pair(pair: CurrencyPair, table: &[(&str, &str)]) -> CurrencyPair {
    CurrencyPair::new(alias(&pair.base, table), alias(&pair.quote, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(venue: Venue, raw: &str) -> (String, String) {
        let p = normalize(venue, raw).unwrap();
        (p.base, p.quote)
    }

    fn p(base: &str, quote: &str) -> (String, String) {
        (base.to_string(), quote.to_string())
    }

    #[test]
    fn test_allowlists_are_longest_first() {
        for list in [FIAT_AND_STABLE, BITFINEX_QUOTES, BYBIT_QUOTES, HUOBI_QUOTES] {
            for w in list.windows(2) {
                let ordered = w[0].len() > w[1].len() || (w[0].len() == w[1].len() && w[0] < w[1]);
                assert!(ordered, "{} before {}", w[0], w[1]);
            }
        }
    }

    #[test]
    fn test_alias_targets_are_not_keys() {
        for table in [BITFINEX_ALIASES, KRAKEN_ALIASES, KUCOIN_ALIASES] {
            for (_, to) in table {
                assert!(table.iter().all(|(from, _)| from != to));
                assert_eq!(alias(&alias(to, table), table), alias(to, table));
            }
        }
    }

    #[test]
    fn test_binance() {
        assert_eq!(pair(Venue::Binance, "BTCUSDT"), p("BTC", "USDT"));
        assert_eq!(pair(Venue::Binance, "BTCUSDC"), p("BTC", "USDC"));
        assert_eq!(pair(Venue::Binance, "BTCUSD"), p("BTC", "USD"));
        assert_eq!(pair(Venue::Binance, "BTCBUSD"), p("BTC", "BUSD"));
        assert_eq!(pair(Venue::Binance, "ethtusd"), p("ETH", "TUSD"));
        assert!(normalize(Venue::Binance, "USDT").is_err());
        assert!(normalize(Venue::Binance, "BTCETH").is_err());
    }

    #[test]
    fn test_bybit() {
        assert_eq!(pair(Venue::Bybit, "BTCUSDT"), p("BTC", "USDT"));
        assert_eq!(pair(Venue::Bybit, "BTCUSD"), p("BTC", "USD"));
        assert!(normalize(Venue::Bybit, "BTCEUR").is_err());
    }

    #[test]
    fn test_bitfinex() {
        assert_eq!(pair(Venue::Bitfinex, "tBTCUSD"), p("BTC", "USD"));
        assert_eq!(pair(Venue::Bitfinex, "tBTCUST"), p("BTC", "USDT"));
        assert_eq!(pair(Venue::Bitfinex, "t1INCH:USD"), p("1INCH", "USD"));
        assert!(normalize(Venue::Bitfinex, "tA:B:C").is_err());
    }

    #[test]
    fn test_bitstamp() {
        assert_eq!(pair(Venue::Bitstamp, "ethusd"), p("ETH", "USD"));
        assert_eq!(pair(Venue::Bitstamp, "ethusdt"), p("ETH", "USDT"));
        assert_eq!(pair(Venue::Bitstamp, "ethbtc"), p("ETH", "BTC"));
        assert_eq!(pair(Venue::Bitstamp, "ethchf"), p("ETH", "CHF"));
        assert_eq!(pair(Venue::Bitstamp, "usdcusdt"), p("USDC", "USDT"));
        assert!(normalize(Venue::Bitstamp, "usd").is_err());
        assert!(normalize(Venue::Bitstamp, "usdt").is_err());
    }

    #[test]
    fn test_huobi() {
        assert_eq!(pair(Venue::Huobi, "btcusdt"), p("BTC", "USDT"));
        assert_eq!(pair(Venue::Huobi, "btcusdc"), p("BTC", "USDC"));
        assert_eq!(pair(Venue::Huobi, "etheuroc"), p("ETH", "EUROC"));
        assert_eq!(pair(Venue::Huobi, "lunaustc"), p("LUNA", "USTC"));
        assert_eq!(pair(Venue::Huobi, "trxht"), p("TRX", "HT"));
        assert!(normalize(Venue::Huobi, "btcxyz").is_err());
    }

    #[test]
    fn test_kraken() {
        assert_eq!(pair(Venue::Kraken, "PAXG/USD"), p("PAXG", "USD"));
        assert_eq!(pair(Venue::Kraken, "XBT/USDC"), p("BTC", "USDC"));
        assert_eq!(pair(Venue::Kraken, "XDG/USD"), p("DOGE", "USD"));
        assert_eq!(pair(Venue::Kraken, "XXBT/ZUSD"), p("BTC", "USD"));
        assert_eq!(pair(Venue::Kraken, "xxbt/zusd"), p("BTC", "USD"));
        assert_eq!(pair(Venue::Kraken, "xdg/usd"), p("DOGE", "USD"));
        assert!(normalize(Venue::Kraken, "XBTUSD").is_err());
    }

    #[test]
    fn test_kucoin() {
        assert_eq!(pair(Venue::Kucoin, "BTC-USDT"), p("BTC", "USDT"));
        assert_eq!(pair(Venue::Kucoin, "BTC-USDC"), p("BTC", "USDC"));
        assert_eq!(pair(Venue::Kucoin, "BCHSV-USDT"), p("BSV", "USDT"));
        assert!(normalize(Venue::Kucoin, "BTC-").is_err());
    }

    #[test]
    fn test_coingecko() {
        assert_eq!(pair(Venue::Coingecko, "bitcoin"), p("BTC", "USD"));
        assert_eq!(pair(Venue::Coingecko, "tether"), p("USDT", "USD"));
        assert_eq!(pair(Venue::Coingecko, "usd-coin"), p("USDC", "USD"));
        assert!(normalize(Venue::Coingecko, "dogecoin").is_err());
    }

    #[test]
    fn test_default_delimiters() {
        assert_eq!(pair(Venue::Okx, "BTC-USDT"), p("BTC", "USDT"));
        assert_eq!(pair(Venue::Fer, "EUR/USD"), p("EUR", "USD"));
        assert_eq!(pair(Venue::Osmosis, "atom_usdc"), p("ATOM", "USDC"));
        assert!(normalize(Venue::Coinbase, "BTCUSD").is_err());
        assert!(normalize(Venue::Bittrex, "A-B-C").is_err());
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let cases = [
            (Venue::Binance, "BTCUSDT"),
            (Venue::Bitfinex, "tBTCUST"),
            (Venue::Kraken, "XBT/USD"),
            (Venue::Kucoin, "WAX-USDT"),
            (Venue::Coingecko, "cosmos"),
            (Venue::Okx, "ETH-USDC"),
        ];
        for (venue, raw) in cases {
            assert_eq!(normalize(venue, raw), normalize(venue, raw));
        }
    }

    #[test]
    fn test_error_carries_symbol() {
        let err = normalize(Venue::Bybit, "FOO").unwrap_err();
        assert_eq!(err.venue, Venue::Bybit);
        assert_eq!(err.symbol, "FOO");
    }
}
