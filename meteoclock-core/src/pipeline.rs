//! The two-stage acquisition cycle: geolocation, then weather at the
//! coordinates the first stage produced.

use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::{
    config::{Config, Endpoint},
    error::{AcquireError, TransportError},
    extract::{FieldSpec, GEO_KEYS, WEATHER_KEYS, extract},
    http::{HttpResponse, HttpSession, HttpTransport, KEEP_ALIVE, RequestContext},
    model::ExtractedFields,
};

pub const GEO_STAGE: &str = "geolocation";
pub const WEATHER_STAGE: &str = "weather";

/// Header block of one exchange and the moment it came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHeaders {
    pub headers: String,
    /// When the response was received. A `Date` header describes this
    /// instant, not the one at which it is eventually read.
    pub received_at: Instant,
}

/// What one cycle produced.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Header blocks of every successful exchange, in order.
    pub server_headers: Vec<ServerHeaders>,
    /// Full field set after a successful weather stage.
    pub snapshot: Option<ExtractedFields>,
    /// Non-fatal problems (parse errors, rejected values).
    pub warnings: Vec<AcquireError>,
    /// The error that ended the cycle early, if any.
    pub failure: Option<AcquireError>,
}

#[derive(Debug)]
pub struct Pipeline {
    transport: Box<dyn HttpTransport>,
    geo: Endpoint,
    weather: Endpoint,
    timeout: Duration,
    fields: ExtractedFields,
}

impl Pipeline {
    pub fn new(
        transport: Box<dyn HttpTransport>,
        geo: Endpoint,
        weather: Endpoint,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            geo,
            weather,
            timeout,
            fields: ExtractedFields::default(),
        }
    }

    pub fn from_config(config: &Config, transport: Box<dyn HttpTransport>) -> Self {
        Self::new(
            transport,
            config.geo.clone(),
            config.weather.clone(),
            config.transport_timeout(),
        )
    }

    /// Fields as left by the most recent cycle.
    pub fn fields(&self) -> &ExtractedFields {
        &self.fields
    }

    /// Runs geolocation then weather. Never retries; a failed stage ends the
    /// cycle and the next cycle starts from scratch.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        info!("Fetching geolocation data from {}...", self.geo.host);
        let geo = RequestContext::get(
            &self.geo.host,
            self.geo.port,
            self.geo.tls,
            self.geo.path.as_str(),
        );
        let response = match self.exchange(GEO_STAGE, &geo).await {
            Ok(response) => response,
            Err(err) => {
                error!("Failed to fetch geolocation data: {err}");
                report.failure = Some(err);
                return report;
            }
        };
        report.server_headers.push(response.server_headers);
        self.absorb(GEO_STAGE, &response.body, GEO_KEYS, &mut report);

        let location = &self.fields.location;
        info!(
            "Location: {} ({}), lat {} lon {}",
            location.city, location.timezone, location.latitude, location.longitude
        );

        if !location.has_coordinates() {
            error!("Cannot request weather without coordinates");
            report.failure = Some(AcquireError::MissingCoordinates);
            return report;
        }

        let path = self
            .weather
            .path_with(location.latitude.as_str(), location.longitude.as_str());
        let weather =
            RequestContext::get(&self.weather.host, self.weather.port, self.weather.tls, path);

        info!("Fetching weather data from {}...", self.weather.host);
        let response = match self.exchange(WEATHER_STAGE, &weather).await {
            Ok(response) => response,
            Err(err) => {
                error!("Failed to fetch weather data: {err}");
                report.failure = Some(err);
                return report;
            }
        };
        report.server_headers.push(response.server_headers);
        self.absorb(WEATHER_STAGE, &response.body, WEATHER_KEYS, &mut report);

        let wx = &self.fields.weather;
        info!(
            "Weather at {}: {} °C, {} % humidity, {} km/h wind, code {}",
            wx.time, wx.temperature, wx.humidity, wx.wind_speed, wx.weather_code
        );

        report.snapshot = Some(self.fields.clone());
        report
    }

    /// Configure, connect, send, receive, disconnect. The session is torn down
    /// whether or not the exchange worked.
    async fn exchange(
        &self,
        stage: &'static str,
        ctx: &RequestContext,
    ) -> Result<Received, AcquireError> {
        let mut session = self
            .transport
            .configure(&ctx.host, ctx.port, ctx.tls)
            .await
            .map_err(|e| AcquireError::from_transport(stage, e))?;

        let result = converse(session.as_mut(), ctx, self.timeout).await;
        let received_at = Instant::now();
        session.disconnect().await;
        drop(session);

        let response = result.map_err(|e| AcquireError::from_transport(stage, e))?;

        if !response.is_success() {
            return Err(AcquireError::Status {
                stage,
                status: response.status,
                excerpt: truncate_body(&response.body),
            });
        }

        Ok(Received {
            server_headers: ServerHeaders {
                headers: response.headers,
                received_at,
            },
            body: response.body,
        })
    }

    fn absorb(
        &mut self,
        stage: &'static str,
        body: &[u8],
        keys: &[FieldSpec],
        report: &mut CycleReport,
    ) {
        match extract(body, keys, &mut self.fields) {
            Ok(outcome) => report.warnings.extend(outcome.rejected),
            Err(source) => {
                warn!("Failed to parse {stage} payload: {source}");
                report.warnings.push(AcquireError::Parse { stage, source });
            }
        }
    }
}

/// A successful exchange, split into what the station needs and the payload.
struct Received {
    server_headers: ServerHeaders,
    body: Vec<u8>,
}

async fn converse(
    session: &mut dyn HttpSession,
    ctx: &RequestContext,
    timeout: Duration,
) -> Result<HttpResponse, TransportError> {
    session.connect(timeout).await?;
    session
        .send_request(ctx.method.clone(), &ctx.path, &[KEEP_ALIVE])
        .await
}

fn truncate_body(body: &[u8]) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        format!("{}...", String::from_utf8_lossy(&body[..MAX]))
    } else {
        String::from_utf8_lossy(body).into_owned()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::Method;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    pub const GEO_BODY: &str = r#"{"ip":"203.0.113.7","city":"Bengaluru","region":"Karnataka",
        "country":"IN","loc":"12.9719,77.5937","timezone":"Asia/Kolkata"}"#;

    pub const WEATHER_BODY: &str = r#"{"latitude":12.97,"longitude":77.59,
        "current_units":{"time":"iso8601","temperature_2m":"°C"},
        "current":{"time":"2024-01-01T10:00","interval":900,"temperature_2m":24.6,
        "relative_humidity_2m":61,"wind_speed_10m":9.4,"weather_code":3}}"#;

    pub const DATE_HEADERS: &str = "HTTP/1.1 200 OK\r\ndate: Mon, 01 Jan 2024 10:00:00 GMT\r\n";

    /// What the fake server does for one exchange.
    #[derive(Debug, Clone)]
    pub enum Script {
        Respond(u16, &'static str),
        /// Like `Respond`, after holding the request for a while.
        RespondAfter(Duration, u16, &'static str),
        FailConfigure,
        FailConnect,
        FailSend,
        TooLarge,
    }

    #[derive(Debug, Default)]
    pub struct Journal {
        /// `host path` of every request sent.
        pub requests: Vec<String>,
        pub configured: usize,
        pub disconnected: usize,
    }

    /// Transport replaying a fixed script, one entry per configure().
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedTransport {
        script: Arc<Mutex<VecDeque<Script>>>,
        pub journal: Arc<Mutex<Journal>>,
    }

    impl ScriptedTransport {
        pub fn new(script: impl IntoIterator<Item = Script>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into_iter().collect())),
                journal: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn configure(
            &self,
            host: &str,
            port: u16,
            _tls: bool,
        ) -> Result<Box<dyn HttpSession>, TransportError> {
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::FailConfigure);

            if matches!(step, Script::FailConfigure) {
                return Err(TransportError::Configure {
                    host: host.to_string(),
                    port,
                    message: "scripted".to_string(),
                });
            }

            self.journal.lock().unwrap().configured += 1;
            Ok(Box::new(ScriptedSession {
                host: host.to_string(),
                step,
                journal: Arc::clone(&self.journal),
            }))
        }
    }

    struct ScriptedSession {
        host: String,
        step: Script,
        journal: Arc<Mutex<Journal>>,
    }

    #[async_trait]
    impl HttpSession for ScriptedSession {
        async fn connect(&mut self, _timeout: Duration) -> Result<(), TransportError> {
            match self.step {
                Script::FailConnect => Err(TransportError::Connect("refused".into())),
                _ => Ok(()),
            }
        }

        async fn send_request(
            &mut self,
            method: Method,
            path: &str,
            headers: &[(&str, &str)],
        ) -> Result<HttpResponse, TransportError> {
            assert_eq!(method, Method::GET);
            assert!(headers.contains(&KEEP_ALIVE));
            self.journal
                .lock()
                .unwrap()
                .requests
                .push(format!("{} {path}", self.host));

            let (status, body) = match self.step {
                Script::Respond(status, body) => (status, body),
                Script::RespondAfter(delay, status, body) => {
                    tokio::time::sleep(delay).await;
                    (status, body)
                }
                Script::TooLarge => return Err(TransportError::TooLarge { limit: 8192 }),
                _ => return Err(TransportError::Send("reset by peer".into())),
            };

            Ok(HttpResponse {
                status,
                headers: DATE_HEADERS.to_string(),
                body: body.as_bytes().to_vec(),
            })
        }

        async fn disconnect(&mut self) {
            self.journal.lock().unwrap().disconnected += 1;
        }
    }

    pub fn pipeline_with(transport: &ScriptedTransport) -> Pipeline {
        Pipeline::from_config(&Config::default(), Box::new(transport.clone()))
    }

    #[tokio::test]
    async fn full_cycle_extracts_both_stages() {
        let transport = ScriptedTransport::new([
            Script::Respond(200, GEO_BODY),
            Script::Respond(200, WEATHER_BODY),
        ]);
        let mut pipeline = pipeline_with(&transport);

        let report = pipeline.run_cycle().await;

        assert!(report.failure.is_none());
        assert!(report.warnings.is_empty());
        assert_eq!(report.server_headers.len(), 2);

        let fields = report.snapshot.unwrap();
        assert_eq!(fields.location.city.as_str(), "Bengaluru");
        assert_eq!(fields.weather.temperature.as_str(), "24.6");
        assert_eq!(fields.weather.weather_code.as_str(), "3");

        let journal = transport.journal.lock().unwrap();
        assert_eq!(journal.requests[0], "ipinfo.io /json");
        assert!(journal.requests[1].starts_with(
            "api.open-meteo.com /v1/forecast?latitude=12.9719&longitude=77.5937&"
        ));
        assert_eq!(journal.configured, 2);
        assert_eq!(journal.disconnected, 2);
    }

    #[tokio::test]
    async fn headers_carry_their_own_receive_time() {
        let transport = ScriptedTransport::new([
            Script::Respond(200, GEO_BODY),
            Script::RespondAfter(Duration::from_millis(200), 200, WEATHER_BODY),
        ]);
        let mut pipeline = pipeline_with(&transport);

        let started = Instant::now();
        let report = pipeline.run_cycle().await;
        let finished = Instant::now();

        let [geo, weather] = report.server_headers.as_slice() else {
            panic!("expected two header blocks, got {:?}", report.server_headers);
        };
        assert!(geo.received_at < started + Duration::from_millis(200));
        assert!(weather.received_at >= geo.received_at + Duration::from_millis(200));
        assert!(weather.received_at <= finished);
    }

    #[tokio::test]
    async fn geolocation_failure_skips_weather() {
        let transport = ScriptedTransport::new([
            Script::FailConnect,
            Script::Respond(200, WEATHER_BODY),
        ]);
        let mut pipeline = pipeline_with(&transport);

        let report = pipeline.run_cycle().await;

        assert!(matches!(
            report.failure,
            Some(AcquireError::Transport { stage: GEO_STAGE, .. })
        ));
        assert!(report.snapshot.is_none());
        assert!(pipeline.fields().weather.temperature.is_empty());

        let journal = transport.journal.lock().unwrap();
        assert!(journal.requests.is_empty());
        assert_eq!(journal.disconnected, 1);
    }

    #[tokio::test]
    async fn weather_failure_releases_session_and_publishes_nothing() {
        let transport = ScriptedTransport::new([Script::Respond(200, GEO_BODY), Script::FailSend]);
        let mut pipeline = pipeline_with(&transport);

        let report = pipeline.run_cycle().await;

        assert!(matches!(
            report.failure,
            Some(AcquireError::Transport {
                stage: WEATHER_STAGE,
                ..
            })
        ));
        assert!(report.snapshot.is_none());
        assert_eq!(report.server_headers.len(), 1);
        assert_eq!(pipeline.fields().location.latitude.as_str(), "12.9719");
        assert_eq!(transport.journal.lock().unwrap().disconnected, 2);
    }

    #[tokio::test]
    async fn error_status_aborts_stage() {
        let transport = ScriptedTransport::new([Script::Respond(429, "rate limited")]);
        let mut pipeline = pipeline_with(&transport);

        let report = pipeline.run_cycle().await;

        match report.failure {
            Some(AcquireError::Status {
                stage, status, excerpt, ..
            }) => {
                assert_eq!(stage, GEO_STAGE);
                assert_eq!(status, 429);
                assert_eq!(excerpt, "rate limited");
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        assert!(report.server_headers.is_empty());
    }

    #[tokio::test]
    async fn oversized_response_is_a_typed_error() {
        let transport = ScriptedTransport::new([Script::Respond(200, GEO_BODY), Script::TooLarge]);
        let mut pipeline = pipeline_with(&transport);

        let report = pipeline.run_cycle().await;
        assert!(matches!(
            report.failure,
            Some(AcquireError::ResponseTooLarge {
                stage: WEATHER_STAGE,
                limit: 8192
            })
        ));
    }

    #[tokio::test]
    async fn configure_failure_needs_no_teardown() {
        let transport = ScriptedTransport::new([Script::FailConfigure]);
        let mut pipeline = pipeline_with(&transport);

        let report = pipeline.run_cycle().await;
        assert!(report.failure.is_some());
        assert_eq!(transport.journal.lock().unwrap().disconnected, 0);
    }

    #[tokio::test]
    async fn malformed_weather_still_yields_snapshot() {
        let transport = ScriptedTransport::new([
            Script::Respond(200, GEO_BODY),
            Script::Respond(200, r#"{"current":{"temperature_2m":31.0,"relative_humidity_2m":"#),
        ]);
        let mut pipeline = pipeline_with(&transport);

        let report = pipeline.run_cycle().await;

        assert!(report.failure.is_none());
        assert!(matches!(
            report.warnings.as_slice(),
            [AcquireError::Parse {
                stage: WEATHER_STAGE,
                ..
            }]
        ));
        assert!(report.snapshot.is_some());
    }

    #[tokio::test]
    async fn bad_loc_keeps_previous_coordinates() {
        let transport = ScriptedTransport::new([
            Script::Respond(200, GEO_BODY),
            Script::Respond(200, WEATHER_BODY),
            Script::Respond(200, r#"{"city":"Somewhere","loc":"unknown"}"#),
            Script::Respond(200, WEATHER_BODY),
        ]);
        let mut pipeline = pipeline_with(&transport);

        assert!(pipeline.run_cycle().await.snapshot.is_some());
        let report = pipeline.run_cycle().await;

        assert!(report.failure.is_none());
        assert!(matches!(
            report.warnings.as_slice(),
            [AcquireError::FieldMismatch { key: "loc", .. }]
        ));
        let fields = report.snapshot.unwrap();
        assert_eq!(fields.location.city.as_str(), "Somewhere");
        assert_eq!(fields.location.latitude.as_str(), "12.9719");
        assert_eq!(fields.location.longitude.as_str(), "77.5937");
    }

    #[tokio::test]
    async fn first_cycle_without_coordinates_stops_before_weather() {
        let transport = ScriptedTransport::new([
            Script::Respond(200, r#"{"city":"Somewhere"}"#),
            Script::Respond(200, WEATHER_BODY),
        ]);
        let mut pipeline = pipeline_with(&transport);

        let report = pipeline.run_cycle().await;
        assert!(matches!(report.failure, Some(AcquireError::MissingCoordinates)));
        assert_eq!(transport.journal.lock().unwrap().requests.len(), 1);
    }

    #[test]
    fn long_bodies_are_truncated_in_errors() {
        let body = vec![b'x'; 500];
        let excerpt = truncate_body(&body);
        assert_eq!(excerpt.len(), 203);
        assert!(excerpt.ends_with("..."));
    }
}
