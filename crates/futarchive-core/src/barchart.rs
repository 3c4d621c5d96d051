//! Barchart web session driver.
//!
//! Implements [`DownloadDriver`] against the provider's website: a scraped
//! CSRF token for login, a download-permission check before every historical
//! download (which is where quota exhaustion surfaces), and the
//! `x-ratelimit-remaining` header on data responses.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{ContractId, Resolution};
use crate::driver::{Credentials, DownloadDriver, DriverFuture, ProviderError};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::normalize::{NormalizeError, RawTable};
use crate::pacing::RateLimitPolicy;
use crate::window::DateWindow;

pub const BARCHART_URL: &str = "https://www.barchart.com/";

const XSRF_COOKIE: &str = "XSRF-TOKEN";
const RATE_LIMIT_HEADER: &str = "x-ratelimit-remaining";

/// Extracts tokens from provider HTML pages.
#[derive(Debug, Clone)]
struct PageScraper {
    tag: Regex,
    attribute: Regex,
}

impl PageScraper {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            tag: Regex::new(r"(?is)<(input|meta)\b([^>]*)>")?,
            attribute: Regex::new(r#"(?s)([A-Za-z_:][-\w:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?,
        })
    }

    /// Attributes of every `name` tag, keys lowercased.
    fn tags(&self, html: &str, name: &str) -> Vec<BTreeMap<String, String>> {
        self.tag
            .captures_iter(html)
            .filter(|captures| captures[1].eq_ignore_ascii_case(name))
            .map(|captures| {
                self.attribute
                    .captures_iter(&captures[2])
                    .map(|attribute| {
                        let value = attribute
                            .get(2)
                            .or_else(|| attribute.get(3))
                            .map(|value| value.as_str())
                            .unwrap_or_default();
                        (attribute[1].to_ascii_lowercase(), value.to_owned())
                    })
                    .collect::<BTreeMap<_, _>>()
            })
            .collect()
    }

    /// Value of the first hidden input on the login page.
    fn login_token(&self, html: &str) -> Option<String> {
        self.tags(html, "input")
            .into_iter()
            .find(|attributes| {
                attributes
                    .get("type")
                    .is_some_and(|kind| kind.eq_ignore_ascii_case("hidden"))
            })
            .and_then(|mut attributes| attributes.remove("value"))
    }

    /// Content of `<meta name="csrf-token">`.
    fn csrf_meta(&self, html: &str) -> Option<String> {
        self.tags(html, "meta")
            .into_iter()
            .find(|attributes| attributes.get("name").is_some_and(|name| name == "csrf-token"))
            .and_then(|mut attributes| attributes.remove("content"))
    }
}

/// Authenticated (or anonymous) Barchart session.
pub struct BarchartDriver {
    http: Arc<dyn HttpClient>,
    base_url: String,
    scraper: PageScraper,
    rate_limit: RateLimitPolicy,
}

impl BarchartDriver {
    /// Session over `http` without logging in.
    pub fn new(http: Arc<dyn HttpClient>) -> Result<Self, ProviderError> {
        let scraper = PageScraper::new()
            .map_err(|error| ProviderError::transient(format!("invalid page pattern: {error}")))?;
        Ok(Self {
            http,
            base_url: BARCHART_URL.to_owned(),
            scraper,
            rate_limit: RateLimitPolicy::default(),
        })
    }

    /// Point the session at another site root (must end with `/`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitPolicy) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Open a session, logging in when `authenticate` is set.
    ///
    /// Fails when credentials are incomplete or the site rejects them.
    pub async fn open_session(
        credentials: &Credentials,
        authenticate: bool,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ProviderError> {
        let driver = Self::new(http)?;
        if authenticate {
            driver.login(credentials).await?;
        }
        Ok(driver)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<(), ProviderError> {
        if !credentials.is_complete() {
            return Err(ProviderError::authentication("credentials are required to log in"));
        }

        let login_url = self.url("login");
        let page = self.send(HttpRequest::get(&login_url)).await?;
        let token = self
            .scraper
            .login_token(&page.body)
            .ok_or_else(|| ProviderError::authentication("login page has no CSRF token"))?;
        info!(url = %login_url, status = page.status, "fetched login page");

        let response = self
            .send(HttpRequest::post(&login_url).with_form([
                ("email", credentials.username()),
                ("password", credentials.password()),
                ("_token", token.as_str()),
            ]))
            .await?;
        info!(url = %login_url, status = response.status, "submitted login");

        if response.final_url.trim_end_matches('/') == login_url.trim_end_matches('/') {
            return Err(ProviderError::authentication("invalid credentials"));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        let url = request.url.clone();
        self.http
            .execute(request)
            .await
            .map_err(|error| {
                ProviderError::transient(format!("request to {url} failed: {}", error.message()))
            })
    }

    fn xsrf_token(response: &HttpResponse) -> Option<String> {
        response
            .cookie(XSRF_COOKIE)
            .and_then(|raw| urlencoding::decode(raw).ok())
            .map(|token| token.into_owned())
    }

    async fn download(
        &self,
        contract: &ContractId,
        resolution: Resolution,
        window: DateWindow,
    ) -> Result<RawTable, ProviderError> {
        let symbol = contract.to_string();
        let page_url = self.url(&format!("futures/quotes/{symbol}/historical-download"));
        let page = self.send(HttpRequest::get(&page_url)).await?;
        info!(url = %page_url, status = page.status, "opened historical download page");
        if page.status != 200 {
            return Err(ProviderError::not_found(format!("no downloadable data for '{symbol}'")));
        }

        let xsrf = Self::xsrf_token(&page)
            .ok_or_else(|| ProviderError::transient("download page did not set an XSRF cookie"))?;
        let csrf = self
            .scraper
            .csrf_meta(&page.body)
            .ok_or_else(|| ProviderError::transient("download page has no csrf-token meta tag"))?;

        let download_url = self.url("my/download");
        let permission = self
            .send(
                HttpRequest::post(&download_url)
                    .with_form([("onlyCheckPermissions", "true")])
                    .with_header("referer", &page_url)
                    .with_header("x-xsrf-token", &xsrf),
            )
            .await?;
        let allowance: Value = serde_json::from_str(&permission.body).map_err(|error| {
            ProviderError::transient(format!("unexpected permission response: {error}"))
        })?;

        if allowance.get("error").is_some_and(|error| !error.is_null()) {
            return Err(ProviderError::quota_exceeded("daily download allowance reached"));
        }
        if allowance.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(ProviderError::not_found(format!("download of '{symbol}' not permitted")));
        }
        let count = allowance.get("count").cloned().unwrap_or(Value::Null);
        info!(
            url = %download_url,
            status = permission.status,
            %count,
            "download allowance confirmed"
        );

        let xsrf = Self::xsrf_token(&permission).unwrap_or(xsrf);
        let start = window.start.to_string();
        let end = window.end.to_string();
        let file_name = format!("{symbol}_Daily_Historical Data");
        let mut form: Vec<(&str, &str)> = vec![
            ("_token", csrf.as_str()),
            ("fileName", file_name.as_str()),
            ("symbol", symbol.as_str()),
            (
                "fields",
                "tradeTime.format(Y-m-d),openPrice,highPrice,lowPrice,lastPrice,volume",
            ),
            ("startDate", start.as_str()),
            ("endDate", end.as_str()),
            ("orderBy", "tradeTime"),
            ("orderDir", "asc"),
            ("method", "historical"),
            ("limit", "20000"),
            ("customView", "true"),
            ("pageTitle", "Historical Data"),
        ];
        match resolution {
            Resolution::Day => form.extend([("type", "eod"), ("period", "daily")]),
            Resolution::Hour => form.extend([("type", "minutes"), ("interval", "60")]),
        }

        let response = self
            .send(
                HttpRequest::post(&download_url)
                    .with_form(form)
                    .with_header("referer", &page_url)
                    .with_header("x-xsrf-token", &xsrf),
            )
            .await?;
        info!(
            url = %download_url,
            status = response.status,
            bytes = response.body.len(),
            "downloaded {} prices",
            resolution.period()
        );
        self.rate_limit.observe(response.header(RATE_LIMIT_HEADER)).await;

        if response.status != 200 {
            return Err(ProviderError::transient(format!(
                "download of '{symbol}' returned status {}",
                response.status
            )));
        }
        RawTable::from_download_csv(&response.body).map_err(|error| payload_error(&symbol, error))
    }

    async fn recent(&self, contract: &ContractId, resolution: Resolution) -> Result<RawTable, ProviderError> {
        let symbol = contract.to_string();
        let chart_url = self.url(&format!("futures/quotes/{symbol}/interactive-chart"));
        let chart = self.send(HttpRequest::get(&chart_url)).await?;
        let xsrf = Self::xsrf_token(&chart)
            .ok_or_else(|| ProviderError::transient("chart page did not set an XSRF cookie"))?;

        let mut request = match resolution {
            Resolution::Day => HttpRequest::get(self.url("proxies/timeseries/queryeod.ashx"))
                .with_query("data", "daily")
                .with_query("contractroll", "expiration"),
            Resolution::Hour => HttpRequest::get(self.url("proxies/timeseries/queryminutes.ashx"))
                .with_query("interval", "60")
                .with_query("contractroll", "combined"),
        };
        for (name, value) in [
            ("symbol", symbol.as_str()),
            ("maxrecords", "640"),
            ("volume", "contract"),
            ("order", "asc"),
            ("dividends", "false"),
            ("backadjust", "false"),
            ("days to expiration", "1"),
        ] {
            request = request.with_query(name, value);
        }
        request = request
            .with_header("content-type", "text/plain; charset=UTF-8")
            .with_header("referer", &chart_url)
            .with_header("x-xsrf-token", &xsrf);

        let response = self.send(request).await?;
        let remaining = response.header(RATE_LIMIT_HEADER);
        debug!(symbol = %symbol, status = response.status, ratelimit = remaining.unwrap_or("-"), "fetched recent prices");
        self.rate_limit.observe(remaining).await;

        if !response.is_success() {
            return Err(ProviderError::transient(format!(
                "recent prices for '{symbol}' returned status {}",
                response.status
            )));
        }
        let table = RawTable::from_timeseries_csv(&response.body)
            .map_err(|error| payload_error(&symbol, error))?;
        if table.is_empty() {
            return Err(ProviderError::not_found(format!("zero length price data for '{symbol}'")));
        }
        Ok(table)
    }

    async fn logout(&self) -> Result<(), ProviderError> {
        let url = self.url("logout");
        let response = self.send(HttpRequest::get(&url).with_timeout_ms(10_000)).await?;
        info!(url = %url, status = response.status, "logged out");
        Ok(())
    }
}

fn payload_error(symbol: &str, error: NormalizeError) -> ProviderError {
    if matches!(error, NormalizeError::ProviderSentinel) {
        warn!(symbol, "provider reported a data problem, not writing");
    }
    ProviderError::transient(format!("unusable payload for '{symbol}': {error}"))
}

impl DownloadDriver for BarchartDriver {
    fn fetch_contract_series<'a>(
        &'a self,
        contract: &'a ContractId,
        resolution: Resolution,
        window: DateWindow,
    ) -> DriverFuture<'a, RawTable> {
        Box::pin(self.download(contract, resolution, window))
    }

    fn fetch_recent_series<'a>(
        &'a self,
        contract: &'a ContractId,
        resolution: Resolution,
    ) -> DriverFuture<'a, RawTable> {
        Box::pin(self.recent(contract, resolution))
    }

    fn close_session<'a>(&'a self) -> DriverFuture<'a, ()> {
        Box::pin(self.logout())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use time::macros::date;

    use super::*;
    use crate::driver::ProviderErrorKind;
    use crate::http_client::HttpError;

    const BASE: &str = "https://bc.test/";

    #[derive(Debug, Default)]
    struct ScriptedHttpClient {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttpClient {
        fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let next = self
                .responses
                .lock()
                .expect("response script should not be poisoned")
                .pop_front()
                .ok_or_else(|| HttpError::non_retryable("script exhausted"));
            Box::pin(async move { next })
        }
    }

    fn driver(client: Arc<ScriptedHttpClient>) -> BarchartDriver {
        BarchartDriver::new(client)
            .expect("driver")
            .with_base_url(BASE)
    }

    fn download_page() -> HttpResponse {
        HttpResponse::ok(r#"<html><head><meta name="csrf-token" content="meta-token"></head></html>"#)
            .with_cookie(XSRF_COOKIE, "abc%3D")
    }

    fn window() -> DateWindow {
        DateWindow {
            start: date!(2019 - 11 - 01),
            end: date!(2020 - 02 - 29),
        }
    }

    #[tokio::test]
    async fn when_credentials_are_rejected_system_reports_authentication_error() {
        // Given: the login form posts back to the login page
        let client = ScriptedHttpClient::new(vec![
            HttpResponse::ok(r#"<form><input type="hidden" name="_token" value="tok123"></form>"#),
            HttpResponse::ok("").with_final_url(format!("{BASE}login")),
        ]);
        let session = driver(client.clone());

        // When: logging in
        let err = session
            .login(&Credentials::new("user@example.test", "secret"))
            .await
            .expect_err("login must fail");

        // Then: the failure is an authentication error and the scraped token was sent
        assert_eq!(err.kind(), ProviderErrorKind::Authentication);
        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].form_value("_token"), Some("tok123"));
        assert_eq!(requests[1].form_value("email"), Some("user@example.test"));
    }

    #[tokio::test]
    async fn when_credentials_are_incomplete_system_does_not_contact_the_site() {
        let client = ScriptedHttpClient::new(Vec::new());
        let result =
            BarchartDriver::open_session(&Credentials::new("", ""), true, client.clone()).await;

        assert!(matches!(result, Err(error) if error.kind() == ProviderErrorKind::Authentication));
        assert!(client.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn when_allowance_reports_error_system_signals_quota_exceeded() {
        let client = ScriptedHttpClient::new(vec![
            download_page(),
            HttpResponse::ok(r#"{"error":"limit reached"}"#),
        ]);
        let session = driver(client);
        let contract = ContractId::parse("A6H20").expect("id");

        let err = session
            .fetch_contract_series(&contract, Resolution::Day, window())
            .await
            .expect_err("quota");

        assert!(err.is_quota_exceeded());
    }

    #[tokio::test]
    async fn when_download_page_is_missing_system_reports_not_found() {
        let client = ScriptedHttpClient::new(vec![HttpResponse::new(404, "")]);
        let session = driver(client);
        let contract = ContractId::parse("A6H20").expect("id");

        let err = session
            .fetch_contract_series(&contract, Resolution::Hour, window())
            .await
            .expect_err("missing");

        assert_eq!(err.kind(), ProviderErrorKind::NotFound);
    }

    #[tokio::test]
    async fn when_download_succeeds_system_returns_rows_without_footer() {
        // Given: a permitted download with two rows and a footer
        let client = ScriptedHttpClient::new(vec![
            download_page(),
            HttpResponse::ok(r#"{"success":true,"count":3}"#),
            HttpResponse::ok("Time,Open,High,Low,Last,Volume\n2020-02-27,1,2,0.5,1.5,10\n2020-02-28,1,2,0.5,1.5,11\nDownloaded from Barchart\n")
                .with_header(RATE_LIMIT_HEADER, "100"),
        ]);
        let session = driver(client.clone());
        let contract = ContractId::parse("A6H20").expect("id");

        // When: downloading daily prices
        let table = session
            .fetch_contract_series(&contract, Resolution::Day, window())
            .await
            .expect("download");

        // Then: rows are returned and the request carried the window and token
        assert_eq!(table.len(), 2);
        let requests = client.recorded_requests();
        let download = &requests[2];
        assert_eq!(download.form_value("startDate"), Some("2019-11-01"));
        assert_eq!(download.form_value("endDate"), Some("2020-02-29"));
        assert_eq!(download.form_value("type"), Some("eod"));
        assert_eq!(download.form_value("_token"), Some("meta-token"));
        assert_eq!(
            requests[1].headers.get("x-xsrf-token").map(String::as_str),
            Some("abc=")
        );
    }

    #[tokio::test]
    async fn when_recent_prices_are_empty_system_reports_not_found() {
        let client = ScriptedHttpClient::new(vec![
            HttpResponse::ok("").with_cookie(XSRF_COOKIE, "tok"),
            HttpResponse::ok("").with_header(RATE_LIMIT_HEADER, "500"),
        ]);
        let session = driver(client.clone());
        let contract = ContractId::parse("GCZ23").expect("id");

        let err = session
            .fetch_recent_series(&contract, Resolution::Hour)
            .await
            .expect_err("empty");

        assert_eq!(err.kind(), ProviderErrorKind::NotFound);
        let requests = client.recorded_requests();
        assert!(requests[1].url.ends_with("queryminutes.ashx"));
        assert_eq!(requests[1].query_value("symbol"), Some("GCZ23"));
    }
}
