// ===============================
// src/catalog.rs
// ===============================
//
// Static ticker catalog. Entries map a ticker to its quote page and a
// display name; the set is fixed at compile time and never mutated.
//
use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;

use crate::domain::StockInfo;

const ENTRIES: &[StockInfo] = &[
    StockInfo { ticker: "LKOH",     url: "https://ru.investing.com/equities/lukoil_rts",             name: "Lukoil" },
    StockInfo { ticker: "AEROFLOT", url: "https://ru.investing.com/equities/aeroflot",               name: "Aeroflot" },
    StockInfo { ticker: "AFKS",     url: "https://ru.investing.com/equities/afk-sistema_rts",        name: "AFK Sistema" },
    StockInfo { ticker: "T",        url: "https://ru.investing.com/equities/tcs-group-holding-plc",  name: "TCS Group Holding" },
    StockInfo { ticker: "MAGN",     url: "https://ru.investing.com/equities/mmk_rts",                name: "MMK" },
    StockInfo { ticker: "SBER",     url: "https://ru.investing.com/equities/sberbank_rts",           name: "Sberbank" },
    StockInfo { ticker: "YDEX",     url: "https://ru.investing.com/equities/yandex",                 name: "Yandex" },
    StockInfo { ticker: "MSTT",     url: "https://ru.investing.com/equities/mostotrest_rts",         name: "Mostotrest" },
    StockInfo { ticker: "APTK",     url: "https://ru.investing.com/equities/apteka-36-6_rts",        name: "Apteka 36.6" },
    StockInfo { ticker: "WUSH",     url: "https://ru.investing.com/equities/whoosh-holding-pao",     name: "Whoosh Holding" },
    StockInfo { ticker: "HEAD",     url: "https://ru.investing.com/equities/headhunter-ipjsc",       name: "HeadHunter" },
    StockInfo { ticker: "FLOT",     url: "https://ru.investing.com/equities/sovcomflot-pao",         name: "Sovcomflot" },
    StockInfo { ticker: "CHMF",     url: "https://ru.investing.com/equities/severstal_rts",          name: "Severstal" },
    StockInfo { ticker: "GAZP",     url: "https://ru.investing.com/equities/gazprom_rts",            name: "Gazprom" },
    StockInfo { ticker: "SIBN",     url: "https://ru.investing.com/equities/gazprom-neft_rts",       name: "Gazprom Neft" },
    StockInfo { ticker: "BLNG",     url: "https://ru.investing.com/equities/belon_rts",              name: "Belon" },
];

static CATALOG: Lazy<HashMap<&'static str, StockInfo>> = Lazy::new(|| {
    let mut m = HashMap::with_capacity(ENTRIES.len());
    for info in ENTRIES {
        m.insert(info.ticker, *info);
    }
    m
});

pub fn lookup(ticker: &str) -> Option<&'static StockInfo> {
    CATALOG.get(ticker)
}

pub fn all() -> impl Iterator<Item = &'static StockInfo> {
    CATALOG.values()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_exact_match() {
        assert!(lookup("LKOH").is_some());
        assert!(lookup("lkoh").is_none());
        assert!(lookup("NOPE").is_none());
    }

    #[test]
    fn entries_are_unique() {
        assert_eq!(all().count(), ENTRIES.len());
    }
}
