use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::{AdapterError, FetchMode};
use crate::config::{CatalogEntry, IngestConfig};
use crate::domain::timestamp::parse_series_timestamp;
use crate::http_client::{HttpClient, HttpRequest};
use crate::throttling::RequestThrottle;
use crate::{AssetType, CanonicalQuote, SeriesInterval, Symbol};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Body keys Alpha Vantage uses instead of a series when it refuses a call.
const UPSTREAM_NOTICE_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

/// Where one asset class's series lives and how its fields are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesLayout {
    pub asset_type: AssetType,
    pub interval: SeriesInterval,
    pub function: &'static str,
    pub symbol_param: &'static str,
    pub fixed_params: &'static [(&'static str, &'static str)],
    pub accepts_outputsize: bool,
    pub container_key: &'static str,
    pub open_key: &'static str,
    pub close_key: &'static str,
    /// `None` when the series carries no volume.
    pub volume_key: Option<&'static str>,
}

const LAYOUTS: [SeriesLayout; 4] = [
    SeriesLayout {
        asset_type: AssetType::Stock,
        interval: SeriesInterval::Daily,
        function: "TIME_SERIES_DAILY",
        symbol_param: "symbol",
        fixed_params: &[],
        accepts_outputsize: true,
        container_key: "Time Series (Daily)",
        open_key: "1. open",
        close_key: "4. close",
        volume_key: Some("5. volume"),
    },
    SeriesLayout {
        asset_type: AssetType::Crypto,
        interval: SeriesInterval::Daily,
        function: "DIGITAL_CURRENCY_DAILY",
        symbol_param: "symbol",
        fixed_params: &[("market", "USD")],
        accepts_outputsize: false,
        container_key: "Time Series (Digital Currency Daily)",
        open_key: "1. open",
        close_key: "4. close",
        volume_key: Some("5. volume"),
    },
    SeriesLayout {
        asset_type: AssetType::Forex,
        interval: SeriesInterval::Daily,
        function: "FX_DAILY",
        symbol_param: "from_symbol",
        fixed_params: &[("to_symbol", "USD")],
        accepts_outputsize: true,
        container_key: "Time Series FX (Daily)",
        open_key: "1. open",
        close_key: "4. close",
        volume_key: None,
    },
    SeriesLayout {
        asset_type: AssetType::Stock,
        interval: SeriesInterval::FiveMinutes,
        function: "TIME_SERIES_INTRADAY",
        symbol_param: "symbol",
        fixed_params: &[("interval", "5min")],
        accepts_outputsize: true,
        container_key: "Time Series (5min)",
        open_key: "1. open",
        close_key: "4. close",
        volume_key: Some("5. volume"),
    },
];

impl SeriesLayout {
    /// Layout for an asset class at a bar interval, if upstream offers one.
    pub fn find(
        asset_type: AssetType,
        interval: SeriesInterval,
    ) -> Option<&'static SeriesLayout> {
        LAYOUTS
            .iter()
            .find(|layout| layout.asset_type == asset_type && layout.interval == interval)
    }

    fn for_entry(entry: &CatalogEntry) -> Result<&'static SeriesLayout, AdapterError> {
        Self::find(entry.asset_type, entry.interval).ok_or(AdapterError::UnsupportedSeries {
            asset_type: entry.asset_type,
            interval: entry.interval,
        })
    }

    fn query_url(&self, symbol: &Symbol, mode: FetchMode, api_key: &str) -> String {
        let mut url = format!(
            "{BASE_URL}?function={}&{}={}",
            self.function,
            self.symbol_param,
            urlencoding::encode(symbol.as_str())
        );
        for (name, value) in self.fixed_params {
            url.push_str(&format!("&{name}={}", urlencoding::encode(value)));
        }
        if self.accepts_outputsize {
            url.push_str(&format!("&outputsize={}", mode.outputsize()));
        }
        url.push_str(&format!("&apikey={}", urlencoding::encode(api_key)));
        url
    }
}

/// An upstream body that arrived with a 2xx status, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSeries {
    pub layout: &'static SeriesLayout,
    pub symbol: Symbol,
    pub body: String,
}

/// Alpha Vantage time-series adapter.
///
/// Every call waits on the shared [`RequestThrottle`] first, so cloned
/// adapters still respect one global spacing.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    request_timeout_ms: u64,
    throttle: RequestThrottle,
}

impl AlphaVantageAdapter {
    pub fn new(config: &IngestConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            api_key: config.api_key.clone(),
            request_timeout_ms: config.request_timeout_ms,
            throttle: RequestThrottle::new(config.min_request_interval),
        }
    }

    /// Fetch and normalize one series, oldest point first.
    ///
    /// The ingestion pipeline calls [`Self::fetch_raw`] and [`parse_series`]
    /// separately so it can record that a response arrived before parsing.
    pub async fn fetch_series(
        &self,
        entry: &CatalogEntry,
        mode: FetchMode,
    ) -> Result<Vec<CanonicalQuote>, AdapterError> {
        let raw = self.fetch_raw(entry, mode).await?;
        parse_series(&raw)
    }

    /// Issue the upstream request. Succeeds once a 2xx response arrived.
    pub async fn fetch_raw(
        &self,
        entry: &CatalogEntry,
        mode: FetchMode,
    ) -> Result<RawSeries, AdapterError> {
        let layout = SeriesLayout::for_entry(entry)?;
        let url = layout.query_url(&entry.symbol, mode, &self.api_key);

        if let Some(delay) = self.throttle.acquire().await {
            debug!(
                delay_ms = delay.as_millis() as u64,
                interval_ms = self.throttle.min_interval().as_millis() as u64,
                "request held back by throttle"
            );
        }
        debug!(
            url = %redact_api_key(&url),
            asset_type = %entry.asset_type,
            interval = %entry.interval,
            symbol = %entry.symbol,
            "requesting series"
        );

        let request = HttpRequest::get(url).with_timeout_ms(self.request_timeout_ms);
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AdapterError::Transport {
                message: e.message().to_owned(),
            })?;

        if !response.is_success() {
            return Err(AdapterError::UpstreamHttp {
                status: response.status,
            });
        }

        Ok(RawSeries {
            layout,
            symbol: entry.symbol.clone(),
            body: response.body,
        })
    }
}

/// Normalize a raw body through its asset layout, sorted ascending.
pub fn parse_series(raw: &RawSeries) -> Result<Vec<CanonicalQuote>, AdapterError> {
    let layout = raw.layout;
    let root: Value = serde_json::from_str(&raw.body)
        .map_err(|e| AdapterError::parse(format!("body is not JSON: {e}")))?;
    let Value::Object(root) = root else {
        return Err(AdapterError::parse("body is not a JSON object"));
    };

    let Some(container) = root.get(layout.container_key) else {
        return Err(AdapterError::UpstreamSchema {
            container_key: layout.container_key,
            message: upstream_notice(&root),
        });
    };
    let Value::Object(container) = container else {
        return Err(AdapterError::parse(format!(
            "'{}' is not an object",
            layout.container_key
        )));
    };

    let mut quotes = Vec::with_capacity(container.len());
    for (key, fields) in container {
        let timestamp = parse_series_timestamp(key)
            .map_err(|e| AdapterError::parse(e.to_string()))?;
        let Value::Object(fields) = fields else {
            return Err(AdapterError::parse(format!("point '{key}' is not an object")));
        };

        let volume = match layout.volume_key {
            Some(volume_key) => Some(number_field(fields, key, volume_key)?),
            None => None,
        };

        quotes.push(CanonicalQuote {
            asset_type: layout.asset_type,
            symbol: raw.symbol.clone(),
            timestamp,
            open: number_field(fields, key, layout.open_key)?,
            close: number_field(fields, key, layout.close_key)?,
            volume,
        });
    }

    quotes.sort_by_key(|quote| quote.timestamp);
    Ok(quotes)
}

fn number_field(fields: &Map<String, Value>, point: &str, name: &str) -> Result<f64, AdapterError> {
    let value = fields
        .get(name)
        .ok_or_else(|| AdapterError::parse(format!("point '{point}' has no '{name}'")))?;

    let parsed = match value {
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    };

    parsed.ok_or_else(|| AdapterError::parse(format!("point '{point}' field '{name}' = {value}")))
}

fn upstream_notice(root: &Map<String, Value>) -> Option<String> {
    UPSTREAM_NOTICE_KEYS.iter().find_map(|key| match root.get(*key) {
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    })
}

/// Replace the `apikey` query value so URLs can be logged.
pub fn redact_api_key(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_owned();
    };
    let redacted: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("apikey", _)) => String::from("apikey=***"),
            _ => pair.to_owned(),
        })
        .collect();
    format!("{base}?{}", redacted.join("&"))
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::http_client::{HttpError, HttpResponse};

    #[derive(Debug)]
    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn replying(response: Result<HttpResponse, HttpError>) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn config() -> IngestConfig {
        IngestConfig::new("alpha-key", "/tmp/unused.duckdb")
            .with_min_request_interval(Duration::from_millis(1))
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    fn daily(asset_type: AssetType) -> &'static SeriesLayout {
        SeriesLayout::find(asset_type, SeriesInterval::Daily).expect("daily layout")
    }

    fn entry(asset_type: AssetType, interval: SeriesInterval, symbol_code: &str) -> CatalogEntry {
        CatalogEntry::new(asset_type, interval, symbol(symbol_code))
    }

    fn raw(asset_type: AssetType, symbol_code: &str, body: &str) -> RawSeries {
        RawSeries {
            layout: daily(asset_type),
            symbol: symbol(symbol_code),
            body: body.to_owned(),
        }
    }

    const STOCK_BODY: &str = r#"{
        "Meta Data": {"2. Symbol": "SPY"},
        "Time Series (Daily)": {
            "2024-01-03": {"1. open": "470.43", "2. high": "471.19", "3. low": "468.17", "4. close": "468.79", "5. volume": "103585876"},
            "2024-01-02": {"1. open": "472.16", "2. high": "473.67", "3. low": "470.49", "4. close": "472.65", "5. volume": "123623730"}
        }
    }"#;

    #[test]
    fn daily_layouts_cover_every_asset_type() {
        for asset_type in AssetType::ALL {
            assert_eq!(daily(asset_type).asset_type, asset_type);
        }
        assert_eq!(daily(AssetType::Forex).volume_key, None);
    }

    #[test]
    fn intraday_layout_exists_for_stocks_only() {
        let layout = SeriesLayout::find(AssetType::Stock, SeriesInterval::FiveMinutes)
            .expect("stock intraday layout");
        assert_eq!(layout.container_key, "Time Series (5min)");
        assert_eq!(layout.volume_key, Some("5. volume"));

        assert!(SeriesLayout::find(AssetType::Crypto, SeriesInterval::FiveMinutes).is_none());
        assert!(SeriesLayout::find(AssetType::Forex, SeriesInterval::FiveMinutes).is_none());
    }

    #[test]
    fn urls_follow_the_asset_layout() {
        let stock = daily(AssetType::Stock).query_url(
            &symbol("SPY"),
            FetchMode::FullHistory,
            "k",
        );
        assert_eq!(
            stock,
            "https://www.alphavantage.co/query?function=TIME_SERIES_DAILY&symbol=SPY&outputsize=full&apikey=k"
        );

        let crypto = daily(AssetType::Crypto).query_url(
            &symbol("BTC"),
            FetchMode::Incremental,
            "k",
        );
        assert_eq!(
            crypto,
            "https://www.alphavantage.co/query?function=DIGITAL_CURRENCY_DAILY&symbol=BTC&market=USD&apikey=k"
        );

        let forex = daily(AssetType::Forex).query_url(
            &symbol("EUR"),
            FetchMode::Incremental,
            "k",
        );
        assert_eq!(
            forex,
            "https://www.alphavantage.co/query?function=FX_DAILY&from_symbol=EUR&to_symbol=USD&outputsize=compact&apikey=k"
        );

        let intraday = SeriesLayout::find(AssetType::Stock, SeriesInterval::FiveMinutes)
            .expect("intraday layout")
            .query_url(&symbol("SPY"), FetchMode::Incremental, "k");
        assert_eq!(
            intraday,
            "https://www.alphavantage.co/query?function=TIME_SERIES_INTRADAY&symbol=SPY&interval=5min&outputsize=compact&apikey=k"
        );
    }

    #[test]
    fn intraday_keys_keep_their_time_of_day() {
        let body = r#"{
            "Meta Data": {"4. Interval": "5min"},
            "Time Series (5min)": {
                "2024-01-02 15:55:00": {"1. open": "472.40", "4. close": "472.61", "5. volume": "912345"},
                "2024-01-02 15:50:00": {"1. open": "472.10", "4. close": "472.38", "5. volume": "604311"}
            }
        }"#;
        let raw = RawSeries {
            layout: SeriesLayout::find(AssetType::Stock, SeriesInterval::FiveMinutes)
                .expect("intraday layout"),
            symbol: symbol("SPY"),
            body: body.to_owned(),
        };

        let quotes = parse_series(&raw).expect("parse");
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].timestamp, datetime!(2024-01-02 15:50:00));
        assert_eq!(quotes[1].timestamp, datetime!(2024-01-02 15:55:00));
        assert_eq!(quotes[1].volume, Some(912_345.0));
    }

    #[test]
    fn stock_series_is_sorted_ascending() {
        let quotes = parse_series(&raw(AssetType::Stock, "SPY", STOCK_BODY)).expect("parse");

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].timestamp, datetime!(2024-01-02 00:00:00));
        assert_eq!(quotes[0].open, 472.16);
        assert_eq!(quotes[0].close, 472.65);
        assert_eq!(quotes[0].volume, Some(123_623_730.0));
        assert_eq!(quotes[1].timestamp, datetime!(2024-01-03 00:00:00));
    }

    #[test]
    fn forex_series_has_no_volume() {
        let body = r#"{"Time Series FX (Daily)": {
            "2024-01-02": {"1. open": "1.10420", "2. high": "1.10450", "3. low": "1.09390", "4. close": "1.09420"}
        }}"#;
        let quotes = parse_series(&raw(AssetType::Forex, "EUR", body)).expect("parse");

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].volume, None);
        assert_eq!(quotes[0].close, 1.0942);
    }

    #[test]
    fn missing_container_is_a_schema_error_with_the_note() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        let error = parse_series(&raw(AssetType::Stock, "SPY", body)).expect_err("must fail");

        match error {
            AdapterError::UpstreamSchema {
                container_key,
                message,
            } => {
                assert_eq!(container_key, "Time Series (Daily)");
                assert!(message.is_some_and(|text| text.contains("5 calls per minute")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_numbers_are_parse_errors() {
        let body = r#"{"Time Series (Daily)": {
            "2024-01-02": {"1. open": "n/a", "4. close": "472.65", "5. volume": "1"}
        }}"#;
        let error = parse_series(&raw(AssetType::Stock, "SPY", body)).expect_err("must fail");
        assert!(matches!(error, AdapterError::Parse { .. }));
    }

    #[test]
    fn malformed_dates_and_non_objects_are_parse_errors() {
        let bad_date = r#"{"Time Series (Daily)": {
            "Jan 2": {"1. open": "1", "4. close": "1", "5. volume": "1"}
        }}"#;
        assert!(matches!(
            parse_series(&raw(AssetType::Stock, "SPY", bad_date)),
            Err(AdapterError::Parse { .. })
        ));
        assert!(matches!(
            parse_series(&raw(AssetType::Stock, "SPY", "[1, 2]")),
            Err(AdapterError::Parse { .. })
        ));
        assert!(matches!(
            parse_series(&raw(AssetType::Stock, "SPY", "<html>")),
            Err(AdapterError::Parse { .. })
        ));
    }

    #[test]
    fn redacts_api_key_from_urls() {
        let url = "https://www.alphavantage.co/query?function=FX_DAILY&apikey=secret&from_symbol=EUR";
        assert_eq!(
            redact_api_key(url),
            "https://www.alphavantage.co/query?function=FX_DAILY&apikey=***&from_symbol=EUR"
        );
    }

    #[tokio::test]
    async fn request_carries_api_key_and_timeout() {
        let client = Arc::new(RecordingHttpClient::replying(Ok(HttpResponse::ok_json(
            STOCK_BODY,
        ))));
        let adapter = AlphaVantageAdapter::new(&config(), client.clone());

        let quotes = adapter
            .fetch_series(
                &entry(AssetType::Stock, SeriesInterval::Daily, "SPY"),
                FetchMode::Incremental,
            )
            .await
            .expect("fetch");
        assert_eq!(quotes.len(), 2);

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query_param("apikey").as_deref(), Some("alpha-key"));
        assert_eq!(requests[0].query_param("outputsize").as_deref(), Some("compact"));
        assert_eq!(requests[0].timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_http() {
        let client = Arc::new(RecordingHttpClient::replying(Ok(HttpResponse::new(
            503,
            "unavailable",
        ))));
        let adapter = AlphaVantageAdapter::new(&config(), client);

        let error = adapter
            .fetch_raw(
                &entry(AssetType::Crypto, SeriesInterval::Daily, "BTC"),
                FetchMode::FullHistory,
            )
            .await
            .expect_err("must fail");
        assert_eq!(error, AdapterError::UpstreamHttp { status: 503 });
    }

    #[tokio::test]
    async fn transport_failures_are_not_skippable() {
        let client = Arc::new(RecordingHttpClient::replying(Err(HttpError::timeout(
            "request timeout",
        ))));
        let adapter = AlphaVantageAdapter::new(&config(), client);

        let error = adapter
            .fetch_raw(
                &entry(AssetType::Forex, SeriesInterval::Daily, "EUR"),
                FetchMode::Incremental,
            )
            .await
            .expect_err("must fail");
        assert!(matches!(error, AdapterError::Transport { .. }));
        assert!(!error.is_skippable());
    }

    #[tokio::test]
    async fn unsupported_interval_fails_before_any_request() {
        let client = Arc::new(RecordingHttpClient::replying(Ok(HttpResponse::ok_json(
            STOCK_BODY,
        ))));
        let adapter = AlphaVantageAdapter::new(&config(), client.clone());

        let error = adapter
            .fetch_raw(
                &entry(AssetType::Forex, SeriesInterval::FiveMinutes, "EUR"),
                FetchMode::Incremental,
            )
            .await
            .expect_err("must fail");

        assert_eq!(
            error,
            AdapterError::UnsupportedSeries {
                asset_type: AssetType::Forex,
                interval: SeriesInterval::FiveMinutes,
            }
        );
        assert!(client.recorded_requests().is_empty());
    }
}
