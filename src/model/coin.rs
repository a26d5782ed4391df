use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coin {
    pub symbol: &'static str,
    pub name: &'static str,
}

impl Coin {
    /// `BTCUSDT` -> `BTC`.
    pub fn base_asset(&self) -> &'static str {
        self.symbol.strip_suffix("USDT").unwrap_or(self.symbol)
    }
}

const fn coin(symbol: &'static str, name: &'static str) -> Coin {
    Coin { symbol, name }
}

pub const COINS: &[Coin] = &[
    coin("BTCUSDT", "Bitcoin"),
    coin("ETHUSDT", "Ethereum"),
    coin("SOLUSDT", "Solana"),
    coin("BNBUSDT", "Binance Coin"),
    coin("ADAUSDT", "Cardano"),
    coin("XRPUSDT", "Ripple"),
    coin("DOGEUSDT", "Dogecoin"),
    coin("DOTUSDT", "Polkadot"),
    coin("AVAXUSDT", "Avalanche"),
    coin("LINKUSDT", "Chainlink"),
    coin("MATICUSDT", "Polygon"),
    coin("LTCUSDT", "Litecoin"),
    coin("UNIUSDT", "Uniswap"),
    coin("ATOMUSDT", "Cosmos"),
    coin("ETCUSDT", "Ethereum Classic"),
    coin("XLMUSDT", "Stellar"),
    coin("FILUSDT", "Filecoin"),
    coin("NEARUSDT", "Near Protocol"),
    coin("VETUSDT", "VeChain"),
    coin("ALGOUSDT", "Algorand"),
    coin("APEUSDT", "ApeCoin"),
    coin("ICPUSDT", "Internet Computer"),
    coin("MANAUSDT", "Decentraland"),
    coin("SANDUSDT", "The Sandbox"),
    coin("AXSUSDT", "Axie Infinity"),
    coin("THETAUSDT", "Theta Network"),
    coin("AAVEUSDT", "Aave"),
    coin("EOSUSDT", "EOS"),
    coin("XTZUSDT", "Tezos"),
    coin("KCSUSDT", "KuCoin Token"),
    coin("MKRUSDT", "Maker"),
    coin("GALAUSDT", "Gala"),
    coin("RUNEUSDT", "THORChain"),
    coin("GRTUSDT", "The Graph"),
    coin("FTMUSDT", "Fantom"),
    coin("SNXUSDT", "Synthetix"),
    coin("CHZUSDT", "Chiliz"),
    coin("ENJUSDT", "Enjin Coin"),
    coin("LRCUSDT", "Loopring"),
    coin("BATUSDT", "Basic Attention Token"),
];

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

pub fn find_coin(symbol: &str) -> Option<&'static Coin> {
    let wanted = normalize_symbol(symbol);
    COINS.iter().find(|c| c.symbol == wanted)
}

pub fn default_coin() -> &'static Coin {
    &COINS[0]
}
