use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use trekky_harvest::config::{parse_config, Config};
use trekky_harvest::crawler::SessionError;
use trekky_harvest::output::write_csv;
use trekky_harvest::report::TOO_MANY_REQUESTS;
use trekky_harvest::{harvest, HarvestStatus, HttpTransport, SessionState};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const GATE: &str = "/Vmi6869kJM7vS70sZKXrwn5Lq0CORjRl";
const GATE_COOKIE: &str = "trekky_gate=granted";
const GATE_SET_COOKIE: &str = "trekky_gate=granted; Path=/";

fn config(server: &MockServer, extra: &str) -> Arc<Config> {
    let text = format!(
        r#"
[harvest]
start-url = "{}/level8"
{}

[navigation]
timeout-ms = 5000

[retry]
max-attempts = 3
base-delay-ms = 10
max-delay-ms = 100
"#,
        server.uri(),
        extra
    );
    Arc::new(parse_config(&text).expect("Failed to parse test config"))
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

/// Listing page `page` (part 1 is the entry page) with two pagination links
/// and three detail links
fn listing_body(page: &str, part: &str) -> String {
    let pagination: String = ["2", "3"]
        .iter()
        .map(|p| {
            format!(
                r#"<li><a href="cities?city=paris&amp;page={}&amp;part={}">{}</a></li>"#,
                page, p, p
            )
        })
        .collect();
    let details: String = (1..=3)
        .map(|i| {
            format!(
                r#"<a class="hotel-link" href="hotels/{}-{}-{}">Hotel</a>"#,
                page, part, i
            )
        })
        .collect();
    format!(r#"{}<ul class="pagination">{}</ul>"#, details, pagination)
}

fn listing_responder(req: &Request) -> ResponseTemplate {
    let mut page = String::from("1");
    let mut part = String::from("1");
    for (key, value) in req.url.query_pairs() {
        match key.as_ref() {
            "page" => page = value.into_owned(),
            "part" => part = value.into_owned(),
            _ => {}
        }
    }
    html(&listing_body(&page, &part))
}

fn detail_responder(req: &Request) -> ResponseTemplate {
    let id = req.url.path().rsplit('/').next().unwrap_or_default().to_string();
    html(&format!(
        r#"<h1 class="hotel-name">Hotel {0}</h1>
           <p class="hotel-email">{0}@trekky.test</p>
           <div class="hotel-review"><span class="review-rating">4</span></div>
           <div class="hotel-review"><span class="review-rating">5</span></div>"#,
        id
    ))
}

async fn mount_home(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/level8/"))
        .respond_with(html("<h1>Trekky Reviews</h1>"))
        .mount(server)
        .await;
}

async fn mount_catalog(server: &MockServer) {
    mount_home(server).await;
    Mock::given(method("GET"))
        .and(path("/level8/cities"))
        .respond_with(listing_responder)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/level8/hotels/"))
        .respond_with(detail_responder)
        .mount(server)
        .await;
}

fn transport(config: &Config) -> Arc<HttpTransport> {
    Arc::new(HttpTransport::new(config.client.clone()))
}

#[tokio::test]
async fn test_nine_sessions_follow_pagination() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let config = config(&server, "sessions = 9");
    let report = harvest(Arc::clone(&config), transport(&config))
        .await
        .expect("Harvest setup failed");

    assert_eq!(report.status(), HarvestStatus::Complete);
    assert_eq!(report.outcomes.len(), 9);
    // 9 sessions x 3 listing pages x 3 details
    assert_eq!(report.records.len(), 81);
    assert!(report.records.iter().all(|r| r.reviews().len() == 2));
    assert!(report.records.iter().all(|r| !r.email().is_empty()));
    assert_eq!(report.records_dropped(), 0);
    assert_eq!(report.pages_acquired(), report.pages_released());

    // Each session covers its own partition
    for outcome in &report.outcomes {
        assert_eq!(outcome.final_state, SessionState::Done);
        assert_eq!(outcome.pages_acquired, 1 + 3 + 9);
    }
    assert!(report.ensure_any_succeeded().is_ok());
}

#[tokio::test]
async fn test_results_written_as_csv() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;

    let config = config(&server, "sessions = 2\nfollow-pagination = false");
    let report = harvest(Arc::clone(&config), transport(&config))
        .await
        .expect("Harvest setup failed");

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let csv_path = dir.path().join("results.csv");
    let rows = write_csv(&csv_path, &report.records).expect("Failed to write CSV");
    assert_eq!(rows, 6);

    let text = std::fs::read_to_string(&csv_path).expect("Failed to read CSV");
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("name,email,reviews"));
    assert_eq!(lines.count(), 6);
    assert!(text.contains(r#""[{""rating"":4.0},{""rating"":5.0}]""#));
}

#[tokio::test]
async fn test_handshake_unlocks_catalog_per_session() {
    let server = MockServer::start().await;
    mount_home(&server).await;

    // First submission is rejected, the rest are granted a session cookie
    let submissions = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&submissions);
    Mock::given(method("POST"))
        .and(path(GATE))
        .respond_with(move |req: &Request| {
            let body = String::from_utf8_lossy(&req.body).to_string();
            assert!(body.starts_with("payload="), "unexpected form: {}", body);
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(403)
                    .set_body_string(r#"{"message": "Forbidden", "description": "Probe rejected"}"#)
            } else {
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", GATE_SET_COOKIE)
            }
        })
        .mount(&server)
        .await;

    // Catalog pages are only served to sessions holding the gate cookie
    Mock::given(method("GET"))
        .and(path("/level8/cities"))
        .and(header("cookie", GATE_COOKIE))
        .respond_with(listing_responder)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/level8/hotels/"))
        .and(header("cookie", GATE_COOKIE))
        .respond_with(detail_responder)
        .mount(&server)
        .await;

    let config = config(
        &server,
        &format!(
            "sessions = 3\nfollow-pagination = false\n\n[handshake]\nendpoint = \"{}\"",
            GATE
        ),
    );
    let report = harvest(Arc::clone(&config), transport(&config))
        .await
        .expect("Harvest setup failed");

    assert_eq!(submissions.load(Ordering::SeqCst), 3);
    assert_eq!(report.status(), HarvestStatus::Partial);
    assert_eq!(report.sessions_failed(), 1);
    assert_eq!(report.records.len(), 2 * 3);

    let rejected = report
        .outcomes
        .iter()
        .find(|o| !o.is_success())
        .expect("One session should fail");
    assert!(matches!(
        rejected.error,
        Some(SessionError::HandshakeRejected { status: 403, .. })
    ));
    assert!(rejected.records.is_empty());
    assert_eq!(rejected.failures.len(), 1);
    assert_eq!(rejected.failures[0].message, "Forbidden");
    assert_eq!(rejected.failures[0].details.as_deref(), Some("Probe rejected"));
    assert_eq!(report.pages_acquired(), report.pages_released());
}

#[tokio::test]
async fn test_rate_limited_detail_is_harvested_on_retry() {
    let server = MockServer::start().await;
    mount_home(&server).await;
    Mock::given(method("GET"))
        .and(path("/level8/cities"))
        .respond_with(listing_responder)
        .mount(&server)
        .await;

    let limited_once = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&limited_once);
    Mock::given(method("GET"))
        .and(path("/level8/hotels/1-1-2"))
        .respond_with(move |req: &Request| {
            if flag.swap(true, Ordering::SeqCst) {
                detail_responder(req)
            } else {
                ResponseTemplate::new(429).set_body_string("Too Many Requests")
            }
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/level8/hotels/"))
        .respond_with(detail_responder)
        .mount(&server)
        .await;

    let config = config(&server, "sessions = 1\nfollow-pagination = false");
    let report = harvest(Arc::clone(&config), transport(&config))
        .await
        .expect("Harvest setup failed");

    assert_eq!(report.status(), HarvestStatus::Complete);
    assert_eq!(report.records.len(), 3);
    assert!(report.records.iter().any(|r| r.name() == "Hotel 1-1-2"));

    let failures = &report.outcomes[0].failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].message, TOO_MANY_REQUESTS);
    assert_eq!(
        failures[0].url,
        format!("{}/level8/hotels/1-1-2", server.uri())
    );
    assert_eq!(report.rate_limit_hits(), 1);
}

#[tokio::test]
async fn test_exhausted_session_does_not_affect_others() {
    let server = MockServer::start().await;
    mount_home(&server).await;

    // Session 2's entry listing is permanently overloaded
    Mock::given(method("GET"))
        .and(path("/level8/cities"))
        .respond_with(|req: &Request| {
            let overloaded = req
                .url
                .query_pairs()
                .any(|(k, v)| k == "page" && v == "2");
            if overloaded {
                ResponseTemplate::new(503).set_body_string("<h1>Service Unavailable</h1>")
            } else {
                listing_responder(req)
            }
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/level8/hotels/"))
        .respond_with(detail_responder)
        .mount(&server)
        .await;

    let config = config(&server, "sessions = 3\nfollow-pagination = false");
    let report = harvest(Arc::clone(&config), transport(&config))
        .await
        .expect("Harvest setup failed");

    assert_eq!(report.status(), HarvestStatus::Partial);
    assert_eq!(report.records.len(), 2 * 3);

    let failed = &report.outcomes[1];
    assert_eq!(failed.session_id, 2);
    assert_eq!(failed.final_state, SessionState::Failed);
    assert!(matches!(
        failed.error,
        Some(SessionError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(failed.failures.len(), 3);
    assert_eq!(failed.failures[0].message, "Service Unavailable");
    assert_eq!(failed.pages_acquired, failed.pages_released);

    assert!(report.outcomes[0].is_success());
    assert!(report.outcomes[2].is_success());
}

#[tokio::test]
async fn test_all_sessions_failed_still_reports() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = config(&server, "sessions = 2");
    let report = harvest(Arc::clone(&config), transport(&config))
        .await
        .expect("Harvest setup failed");

    assert_eq!(report.status(), HarvestStatus::AllSessionsFailed);
    assert!(report.records.is_empty());
    assert!(report.ensure_any_succeeded().is_err());
    assert_eq!(report.pages_acquired(), 2 * 3);
    assert_eq!(report.pages_acquired(), report.pages_released());
}

#[tokio::test]
async fn test_invalid_records_are_dropped() {
    let server = MockServer::start().await;
    mount_home(&server).await;
    Mock::given(method("GET"))
        .and(path("/level8/cities"))
        .respond_with(listing_responder)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/level8/hotels/1-1-3"))
        .respond_with(html(
            r#"<h1 class="hotel-name">No Contact Inn</h1>
               <div class="hotel-review"><span class="review-rating">great</span></div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/level8/hotels/1-1-1"))
        .respond_with(html(
            r#"<h1 class="hotel-name">Odd Ratings Hotel</h1>
               <p class="hotel-email">odd@trekky.test</p>
               <div class="hotel-review"><span class="review-rating">five stars</span></div>
               <div class="hotel-review"><span class="review-rating">3.5</span></div>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/level8/hotels/"))
        .respond_with(detail_responder)
        .mount(&server)
        .await;

    let config = config(&server, "sessions = 1\nfollow-pagination = false");
    let report = harvest(Arc::clone(&config), transport(&config))
        .await
        .expect("Harvest setup failed");

    assert_eq!(report.status(), HarvestStatus::Complete);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records_dropped(), 1);

    let odd = &report.records[0];
    assert_eq!(odd.name(), "Odd Ratings Hotel");
    assert_eq!(odd.reviews()[0].rating, None);
    assert_eq!(odd.reviews()[1].rating, Some(3.5));
}
