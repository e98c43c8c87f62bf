//! Broker REST gateway
//!
//! Blocking HTTP client for an OANDA-v20-style forex broker API with
//! bearer-token authentication. Implements both collaborator traits:
//! candles/pricing for market data, market orders with attached stop/target
//! for execution, and trade queries for lifecycle management.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::smc::{Candle, CandleSeries, Direction, Timeframe};

use super::{
    ExecutionGateway, MarketDataSource, OrderOutcome, OrderRequest, PositionSnapshot, Quote,
    RealizedPnl,
};

/// Practice environment base URL
pub const PRACTICE_BASE_URL: &str = "https://api-fxpractice.oanda.com";

/// Live environment base URL
pub const LIVE_BASE_URL: &str = "https://api-fxtrade.oanda.com";

// ============================================================================
// API models
// ============================================================================

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: Vec<ApiCandle>,
}

#[derive(Debug, Deserialize)]
struct ApiCandle {
    time: DateTime<Utc>,
    volume: u64,
    complete: bool,
    mid: ApiOhlc,
}

/// Prices arrive as decimal strings
#[derive(Debug, Deserialize)]
struct ApiOhlc {
    o: String,
    h: String,
    l: String,
    c: String,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    prices: Vec<ApiPrice>,
}

#[derive(Debug, Deserialize)]
struct ApiPrice {
    bids: Vec<ApiPriceLevel>,
    asks: Vec<ApiPriceLevel>,
}

#[derive(Debug, Deserialize)]
struct ApiPriceLevel {
    price: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketOrderBody {
    order: MarketOrder,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketOrder {
    #[serde(rename = "type")]
    order_type: &'static str,
    instrument: String,
    /// Signed units: positive buys, negative sells
    units: String,
    stop_loss_on_fill: PriceField,
    take_profit_on_fill: PriceField,
}

#[derive(Debug, Serialize, Deserialize)]
struct PriceField {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_fill_transaction: Option<FillTransaction>,
    order_reject_transaction: Option<RejectTransaction>,
    order_cancel_transaction: Option<RejectTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillTransaction {
    trade_opened: Option<TradeOpened>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeOpened {
    #[serde(rename = "tradeID")]
    trade_id: String,
    price: String,
    units: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectTransaction {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TradeOrdersBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_loss: Option<PriceField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    take_profit: Option<PriceField>,
}

#[derive(Debug, Serialize)]
struct CloseTradeBody {
    units: String,
}

#[derive(Debug, Deserialize)]
struct TradeResponse {
    trade: ApiTrade,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTrade {
    id: String,
    instrument: String,
    /// Signed units; negative for short trades
    current_units: String,
    /// Entry price
    price: String,
    state: String,
    #[serde(default)]
    realized_pl: Option<String>,
    #[serde(default)]
    average_close_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountSummaryResponse {
    account: AccountSummary,
}

#[derive(Debug, Deserialize)]
struct AccountSummary {
    balance: String,
}

// ============================================================================
// Client
// ============================================================================

/// Broker instrument code for a plain symbol ("EURUSD" -> "EUR_USD")
fn instrument(symbol: &str) -> String {
    if symbol.len() > 3 && !symbol.contains('_') {
        let (base, quote) = symbol.split_at(symbol.len() - 3);
        format!("{}_{}", base, quote)
    } else {
        symbol.to_string()
    }
}

fn parse_price(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("unparseable price '{}'", value))
}

/// Blocking broker REST client
pub struct RestGateway {
    client: Client,
    base_url: String,
    token: String,
    account_id: String,
    /// Balance cached from the last summary fetch
    balance: f64,
}

impl RestGateway {
    /// Create a client from environment variables
    ///
    /// Expects:
    /// - `BROKER_TOKEN` - API bearer token
    /// - `BROKER_ACCOUNT_ID` - Account identifier
    /// - `BROKER_LIVE` (optional) - Set to "true" for the live environment
    pub fn from_env() -> Result<Self> {
        let token =
            std::env::var("BROKER_TOKEN").context("BROKER_TOKEN environment variable not set")?;
        let account_id = std::env::var("BROKER_ACCOUNT_ID")
            .context("BROKER_ACCOUNT_ID environment variable not set")?;
        let is_live = std::env::var("BROKER_LIVE")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let base_url = if is_live {
            LIVE_BASE_URL.to_string()
        } else {
            PRACTICE_BASE_URL.to_string()
        };

        Ok(Self::new(token, account_id, base_url))
    }

    pub fn new(token: String, account_id: String, base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            token,
            account_id,
            balance: 0.0,
        }
    }

    /// Verify connectivity and cache the account balance.
    ///
    /// Failure here is fatal to the session: the run aborts before any
    /// trading begins.
    pub fn connect(&mut self) -> Result<()> {
        info!("Connecting to broker at {}...", self.base_url);
        let balance = self.fetch_balance()?;
        self.balance = balance;
        info!("Connected. Account {} balance {:.2}", self.account_id, balance);
        Ok(())
    }

    /// Re-fetch the account balance, keeping the cache on failure
    pub fn refresh_balance(&mut self) {
        match self.fetch_balance() {
            Ok(balance) => self.balance = balance,
            Err(e) => warn!("Balance refresh failed: {:#}", e),
        }
    }

    fn fetch_balance(&self) -> Result<f64> {
        let summary: AccountSummaryResponse =
            self.get(&format!("/v3/accounts/{}/summary", self.account_id))?;
        parse_price(&summary.account.balance)
    }

    fn get<R: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<R> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .with_context(|| format!("Failed to send GET request to {}", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("GET {} failed ({}): {}", endpoint, status, body));
        }

        response
            .json()
            .with_context(|| format!("Failed to parse response from {}", endpoint))
    }

    fn send_json<T: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let response = self
            .client
            .request(method.clone(), format!("{}{}", self.base_url, endpoint))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .with_context(|| format!("Failed to send {} request to {}", method, endpoint))?;

        let status = response.status();
        let text = response.text().unwrap_or_default();

        if !status.is_success() {
            return Err(anyhow!("{} {} failed ({}): {}", method, endpoint, status, text));
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse response from {}: {}", endpoint, text))
    }

    fn fetch_trade(&self, ticket: i64) -> Result<ApiTrade> {
        let response: TradeResponse = self.get(&format!(
            "/v3/accounts/{}/trades/{}",
            self.account_id, ticket
        ))?;
        Ok(response.trade)
    }
}

impl MarketDataSource for RestGateway {
    fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<CandleSeries> {
        let endpoint = format!(
            "/v3/instruments/{}/candles?granularity={}&count={}&price=M",
            instrument(symbol),
            timeframe.granularity(),
            count
        );
        let response: CandlesResponse = self.get(&endpoint)?;

        let mut candles = Vec::with_capacity(response.candles.len());
        for c in response.candles.into_iter().filter(|c| c.complete) {
            candles.push(Candle {
                time: c.time,
                open: parse_price(&c.mid.o)?,
                high: parse_price(&c.mid.h)?,
                low: parse_price(&c.mid.l)?,
                close: parse_price(&c.mid.c)?,
                volume: c.volume,
            });
        }
        debug!("[{}] fetched {} {} candles", symbol, candles.len(), timeframe);
        Ok(CandleSeries::new(candles))
    }

    fn quote(&self, symbol: &str) -> Result<Quote> {
        let endpoint = format!(
            "/v3/accounts/{}/pricing?instruments={}",
            self.account_id,
            instrument(symbol)
        );
        let response: PricingResponse = self.get(&endpoint)?;
        let price = response
            .prices
            .first()
            .ok_or_else(|| anyhow!("no pricing for {}", symbol))?;

        let bid = price
            .bids
            .first()
            .ok_or_else(|| anyhow!("no bid for {}", symbol))?;
        let ask = price
            .asks
            .first()
            .ok_or_else(|| anyhow!("no ask for {}", symbol))?;

        Ok(Quote {
            bid: parse_price(&bid.price)?,
            ask: parse_price(&ask.price)?,
        })
    }
}

impl ExecutionGateway for RestGateway {
    fn place_order(&mut self, request: &OrderRequest) -> OrderOutcome {
        let units = match request.direction {
            // Standard lots to units
            Direction::Buy => (request.volume * 100_000.0).round() as i64,
            Direction::Sell => -(request.volume * 100_000.0).round() as i64,
        };
        let body = MarketOrderBody {
            order: MarketOrder {
                order_type: "MARKET",
                instrument: instrument(&request.symbol),
                units: units.to_string(),
                stop_loss_on_fill: PriceField { price: request.stop_loss.to_string() },
                take_profit_on_fill: PriceField { price: request.take_profit.to_string() },
            },
        };

        let endpoint = format!("/v3/accounts/{}/orders", self.account_id);
        let response: OrderResponse =
            match self.send_json(reqwest::Method::POST, &endpoint, &body) {
                Ok(r) => r,
                Err(e) => {
                    return OrderOutcome::Rejected { error: format!("{:#}", e), code: -1 };
                }
            };

        if let Some(fill) = response.order_fill_transaction {
            if let Some(opened) = fill.trade_opened {
                let ticket = opened.trade_id.parse::<i64>().unwrap_or(-1);
                let fill_price = opened.price.parse::<f64>().unwrap_or(request.price);
                let fill_volume =
                    opened.units.parse::<f64>().map(|u| u.abs() / 100_000.0).unwrap_or(request.volume);
                info!(
                    "Order filled: ticket {} {} {} {:.2} lots @ {:.5}",
                    ticket, request.symbol, request.direction, fill_volume, fill_price
                );
                return OrderOutcome::Filled { ticket, fill_price, fill_volume };
            }
        }

        let reason = response
            .order_reject_transaction
            .or(response.order_cancel_transaction)
            .and_then(|t| t.reason)
            .unwrap_or_else(|| "unknown rejection".to_string());
        OrderOutcome::Rejected { error: reason, code: 0 }
    }

    fn modify_position(
        &mut self,
        ticket: i64,
        _symbol: &str,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool {
        let body = TradeOrdersBody {
            stop_loss: stop_loss.map(|p| PriceField { price: p.to_string() }),
            take_profit: take_profit.map(|p| PriceField { price: p.to_string() }),
        };
        let endpoint = format!("/v3/accounts/{}/trades/{}/orders", self.account_id, ticket);
        match self.send_json::<_, serde_json::Value>(reqwest::Method::PUT, &endpoint, &body) {
            Ok(_) => true,
            Err(e) => {
                warn!("Modify of trade {} failed: {:#}", ticket, e);
                false
            }
        }
    }

    fn close_position(
        &mut self,
        ticket: i64,
        _symbol: &str,
        volume: f64,
        _direction: Direction,
        _price: f64,
    ) -> bool {
        let body = CloseTradeBody {
            units: ((volume * 100_000.0).round() as i64).to_string(),
        };
        let endpoint = format!("/v3/accounts/{}/trades/{}/close", self.account_id, ticket);
        match self.send_json::<_, serde_json::Value>(reqwest::Method::PUT, &endpoint, &body) {
            Ok(_) => true,
            Err(e) => {
                warn!("Close of trade {} failed: {:#}", ticket, e);
                false
            }
        }
    }

    fn query_open(&self, ticket: i64) -> Option<PositionSnapshot> {
        let trade = self.fetch_trade(ticket).ok()?;
        if trade.state != "OPEN" {
            return None;
        }

        let units = trade.current_units.parse::<f64>().ok()?;
        let direction = if units >= 0.0 { Direction::Buy } else { Direction::Sell };
        let entry_price = trade.price.parse::<f64>().ok()?;

        // Mark at the closable side of the book.
        let quote = self.quote(&trade.instrument).ok()?;
        let current_price = match direction {
            Direction::Buy => quote.bid,
            Direction::Sell => quote.ask,
        };

        Some(PositionSnapshot {
            ticket: trade.id.parse().unwrap_or(ticket),
            symbol: trade.instrument.replace('_', ""),
            direction,
            volume: units.abs() / 100_000.0,
            entry_price,
            current_price,
        })
    }

    fn query_realized_pnl(&self, ticket: i64) -> Option<RealizedPnl> {
        let trade = self.fetch_trade(ticket).ok()?;
        let profit = trade.realized_pl.as_deref().and_then(|p| p.parse().ok())?;
        let exit_price = trade
            .average_close_price
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(0.0);
        Some(RealizedPnl { profit, exit_price })
    }

    fn account_balance(&self) -> f64 {
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_mapping() {
        assert_eq!(instrument("EURUSD"), "EUR_USD");
        assert_eq!(instrument("GBPJPY"), "GBP_JPY");
        assert_eq!(instrument("EUR_USD"), "EUR_USD");
    }

    #[test]
    fn test_candle_response_parsing() {
        let json = r#"{
            "candles": [
                {"time": "2025-06-02T12:00:00Z", "volume": 412, "complete": true,
                 "mid": {"o": "1.10010", "h": "1.10090", "l": "1.09980", "c": "1.10070"}},
                {"time": "2025-06-02T12:15:00Z", "volume": 123, "complete": false,
                 "mid": {"o": "1.10070", "h": "1.10110", "l": "1.10050", "c": "1.10100"}}
            ]
        }"#;
        let parsed: CandlesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.candles.len(), 2);
        assert!(parsed.candles[0].complete);
        assert_eq!(parsed.candles[0].mid.h, "1.10090");
    }

    #[test]
    fn test_order_response_parsing() {
        let json = r#"{
            "orderFillTransaction": {
                "tradeOpened": {"tradeID": "6210", "price": "1.10463", "units": "2000"}
            }
        }"#;
        let parsed: OrderResponse = serde_json::from_str(json).unwrap();
        let opened = parsed.order_fill_transaction.unwrap().trade_opened.unwrap();
        assert_eq!(opened.trade_id, "6210");
    }
}
