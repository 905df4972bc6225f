//! End-to-end behavior over real HTTP.
//!
//! Two mock servers on different ports play the site (same origin) and the
//! CDN (cross origin).

use std::sync::Arc;

use riplay_offline_core::{
    CacheStorage, GenerationState, Host, HostError, HttpNetwork, Manifest, Request, WorkerError,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Site {
    _dir: tempfile::TempDir,
    site: MockServer,
    cdn: MockServer,
    host: Host,
}

impl Site {
    async fn start() -> Self {
        let site = MockServer::start().await;
        let cdn = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let storage = Arc::new(CacheStorage::new(dir.path().join("caches")).unwrap());
        let network = Arc::new(HttpNetwork::new(None).unwrap());
        let base = Url::parse(&format!("{}/", site.uri())).unwrap();

        Self {
            _dir: dir,
            host: Host::new(base, storage, network),
            site,
            cdn,
        }
    }

    fn site_url(&self, p: &str) -> String {
        format!("{}{}", self.site.uri(), p)
    }

    fn cdn_url(&self, p: &str) -> String {
        format!("{}{}", self.cdn.uri(), p)
    }
}

async fn serve(server: &MockServer, p: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
}

#[tokio::test]
async fn install_then_serve_offline() {
    let site = Site::start().await;
    serve(&site.site, "/index.html", "<html>").await;
    serve(&site.cdn, "/css/all.min.css", ".fa{}").await;

    let manifest = Manifest::new(["/index.html".to_string(), site.cdn_url("/css/all.min.css")]);
    let registration = site.host.register("riplay-cache-v1", manifest).await.unwrap();
    assert_eq!(registration.state, GenerationState::Active);

    // Take both servers away
    site.site.reset().await;
    site.cdn.reset().await;

    // CDN asset still served from the cache
    let css = site.host.fetch(get(&site.cdn_url("/css/all.min.css"))).await.unwrap();
    assert_eq!(css.text(), ".fa{}");

    // The site now answers 404, which is a live response and wins
    let page = site.host.fetch(get(&site.site_url("/index.html"))).await.unwrap();
    assert_eq!(page.status, 404);
}

#[tokio::test]
async fn broken_manifest_entry_aborts_install() {
    let site = Site::start().await;
    serve(&site.site, "/index.html", "<html>").await;
    // "/js/app.js" answers 404

    let err = site
        .host
        .register("riplay-cache-v2", Manifest::new(["/index.html", "/js/app.js"]))
        .await
        .unwrap_err();

    assert!(matches!(err, HostError::Worker(WorkerError::Install { .. })));
    assert!(site.host.active_version().await.is_none());
    assert!(site.host.storage().keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn same_origin_refreshes_stored_copy() {
    let site = Site::start().await;
    serve(&site.site, "/locales/en.json", r#"{"v":1}"#).await;
    site.host
        .register("riplay-cache-v1", Manifest::new(["/locales/en.json"]))
        .await
        .unwrap();

    site.site.reset().await;
    serve(&site.site, "/locales/en.json", r#"{"v":2}"#).await;

    let fresh = site.host.fetch(get(&site.site_url("/locales/en.json"))).await.unwrap();
    assert_eq!(fresh.text(), r#"{"v":2}"#);

    let stored = site
        .host
        .storage()
        .match_request("riplay-cache-v1", &get(&site.site_url("/locales/en.json")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.text(), r#"{"v":2}"#);
}

#[tokio::test]
async fn cross_origin_miss_is_fetched_but_not_stored() {
    let site = Site::start().await;
    site.host
        .register("riplay-cache-v1", Manifest::new(Vec::<String>::new()))
        .await
        .unwrap();
    serve(&site.cdn, "/flags/cz.svg", "<svg/>").await;

    let url = site.cdn_url("/flags/cz.svg");
    let response = site.host.fetch(get(&url)).await.unwrap();
    assert_eq!(response.text(), "<svg/>");

    let stored = site
        .host
        .storage()
        .match_request("riplay-cache-v1", &get(&url))
        .await
        .unwrap();
    assert!(stored.is_none());
}
