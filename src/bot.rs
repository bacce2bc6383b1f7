// ===============================
// src/bot.rs
// ===============================
//
// Inbound Telegram surface: long-poll getUpdates, parse requests, reply.
//
// Accepted input:
//   /start           -> help text
//   /list            -> available tickers
//   TICKER           -> current price
//   TICKER PRICE     -> create a target alert via the registry
//
// Malformed input gets a user-visible rejection and creates no state.
//
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::catalog;
use crate::registry::{RequestError, TargetAlertRegistry};
use crate::source::PriceSource;
use crate::telegram::TelegramClient;

const POLL_TIMEOUT_SECS: u64 = 50;

/// Unattended update loop. Poll failures back off and retry.
pub async fn run(
    api: TelegramClient,
    source: Arc<dyn PriceSource>,
    registry: Arc<TargetAlertRegistry>,
) {
    info!("bot update loop started");
    let mut offset: i64 = 0;

    loop {
        let updates = match api.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(u) => u,
            Err(e) => {
                error!(?e, "getUpdates failed");
                sleep(Duration::from_secs(3)).await;
                continue;
            }
        };

        for upd in updates {
            offset = offset.max(upd.update_id + 1);
            let Some(msg) = upd.message else { continue };
            let Some(text) = msg.text.as_deref() else { continue };
            let chat_id = msg.chat.id;

            if let Some(reply) = handle_message(text, chat_id, &*source, &registry).await {
                if let Err(e) = api.send_message(chat_id, &reply).await {
                    error!(?e, chat_id, "reply send failed");
                }
            }
        }
    }
}

async fn handle_message(
    text: &str,
    chat_id: i64,
    source: &dyn PriceSource,
    registry: &TargetAlertRegistry,
) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(cmd) = text.strip_prefix('/') {
        let reply = match cmd.split_whitespace().next().unwrap_or("") {
            "start" => help_text(),
            "list" => list_text(),
            _ => "Unknown command. Try /start or /list.".to_string(),
        };
        return Some(reply);
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [ticker] => Some(price_reply(ticker, source).await),
        [ticker, price] => Some(alert_reply(ticker, price, chat_id, registry).await),
        _ => Some(
            "Unrecognized request. Send a ticker for the current price, or 'TICKER PRICE' to set an alert."
                .to_string(),
        ),
    }
}

async fn price_reply(ticker: &str, source: &dyn PriceSource) -> String {
    let ticker = ticker.to_ascii_uppercase();
    let Some(info) = catalog::lookup(&ticker) else {
        return format!("Ticker {ticker} is not in the catalog.");
    };
    match source.fetch(info).await {
        Ok(q) => format!("{}\nCurrent price: {:.2}", q.name, q.price),
        Err(e) => {
            warn!(?e, %ticker, "price query failed");
            format!("Could not fetch the current price for {ticker}. Try again later.")
        }
    }
}

async fn alert_reply(
    ticker: &str,
    price_text: &str,
    chat_id: i64,
    registry: &TargetAlertRegistry,
) -> String {
    let ticker = ticker.to_ascii_uppercase();
    // accept the decimal comma here too
    let target: f64 = match price_text.replace(',', ".").parse() {
        Ok(p) => p,
        Err(_) => return RequestError::InvalidPrice(price_text.to_string()).to_string(),
    };

    match registry.submit(&ticker, target, chat_id).await {
        Ok(alert) => {
            let name = catalog::lookup(&alert.symbol)
                .map(|i| i.name)
                .unwrap_or(alert.symbol.as_str());
            format!(
                "Alert set for {}: you will be notified when the price reaches {:.2}.",
                name, alert.target
            )
        }
        Err(e) => e.to_string(),
    }
}

fn help_text() -> String {
    "Hi! Send a ticker (e.g. LKOH or SBER) to get the current price.\n\
     To set an alert, send: TICKER PRICE\n\
     For example: LKOH 7100.0\n\
     Send /list to see the available tickers."
        .to_string()
}

fn list_text() -> String {
    let mut entries: Vec<_> = catalog::all().collect();
    entries.sort_by_key(|i| i.ticker);

    let mut out = String::from("Available tickers:\n");
    for info in entries {
        out.push_str(&format!("{} - {}\n", info.ticker, info.name));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StockInfo;
    use crate::notify::{Notifier, SendError};
    use crate::source::{FetchError, Quote};
    use async_trait::async_trait;

    struct FixedSource {
        price: f64,
    }

    #[async_trait]
    impl PriceSource for FixedSource {
        async fn fetch(&self, info: &StockInfo) -> Result<Quote, FetchError> {
            Ok(Quote { name: info.name.to_string(), price: self.price })
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send(&self, _chat_id: i64, _text: &str) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn fixture(price: f64) -> (Arc<FixedSource>, TargetAlertRegistry) {
        let source = Arc::new(FixedSource { price });
        let registry = TargetAlertRegistry::new(source.clone(), Arc::new(NullNotifier), None);
        (source, registry)
    }

    #[tokio::test]
    async fn one_token_returns_price() {
        let (source, registry) = fixture(7050.0);
        let reply = handle_message("lkoh", 42, &*source, &registry).await.unwrap();
        assert!(reply.contains("Lukoil"));
        assert!(reply.contains("7050.00"));
    }

    #[tokio::test]
    async fn two_tokens_create_alert() {
        let (source, registry) = fixture(7050.0);
        let reply = handle_message("LKOH 7100", 42, &*source, &registry).await.unwrap();
        assert!(reply.contains("Alert set"));
        assert_eq!(registry.active().await, 1);
    }

    #[tokio::test]
    async fn bad_price_is_rejected_without_state() {
        let (source, registry) = fixture(7050.0);
        let reply = handle_message("LKOH abc", 42, &*source, &registry).await.unwrap();
        assert!(reply.contains("Bad price format"));
        assert_eq!(registry.active().await, 0);
    }

    #[tokio::test]
    async fn unknown_ticker_is_rejected() {
        let (source, registry) = fixture(7050.0);
        let reply = handle_message("NOPE", 42, &*source, &registry).await.unwrap();
        assert!(reply.contains("not in the catalog"));
        let reply = handle_message("NOPE 100", 42, &*source, &registry).await.unwrap();
        assert!(reply.contains("not in the catalog"));
    }

    #[tokio::test]
    async fn commands_answer_help_and_list() {
        let (source, registry) = fixture(7050.0);
        let help = handle_message("/start", 42, &*source, &registry).await.unwrap();
        assert!(help.contains("TICKER PRICE"));
        let list = handle_message("/list", 42, &*source, &registry).await.unwrap();
        assert!(list.contains("LKOH"));
        assert!(list.contains("Sberbank"));
    }
}
