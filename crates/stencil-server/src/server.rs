//! Development server implementation.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::sync::{broadcast, mpsc};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use stencil_static::{BuildConfig, BuildError, BuildResult, StaticBuilder};

use crate::watcher::{FileWatcher, WatchEvent, WatchTargets};
use crate::websocket::{
    reload_client_script, ReloadHub, ReloadMessage, RELOAD_SCRIPT_PATH, RELOAD_SOCKET_PATH,
};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// What to build and where to write it
    pub build: BuildConfig,

    /// Site config file, watched alongside the inputs
    pub config_file: Option<PathBuf>,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            config_file: None,
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Initial build failed: {0}")]
    InitialBuild(#[source] BuildError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Build task failed: {0}")]
    BuildTask(String),

    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Server error: {0}")]
    Serve(String),
}

/// Re-reads the build settings after the site config file changes.
pub type ConfigLoader = Arc<dyn Fn() -> Result<BuildConfig, String> + Send + Sync>;

/// Shared server state.
pub struct ServerState {
    output_dir: PathBuf,
    hub: ReloadHub,
    live_reload: bool,
}

impl ServerState {
    /// State for the development server: pages get the reload script.
    pub fn new(output_dir: PathBuf, hub: ReloadHub) -> Self {
        Self {
            output_dir,
            hub,
            live_reload: true,
        }
    }

    /// State for previewing a finished build: pages are served untouched.
    pub fn preview(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            hub: ReloadHub::new(),
            live_reload: false,
        }
    }
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    config_loader: Option<ConfigLoader>,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig) -> Self {
        Self {
            config,
            config_loader: None,
        }
    }

    /// Reload the build settings with `loader` whenever the config file
    /// changes. Without one, every rebuild uses the startup settings.
    pub fn with_config_loader(mut self, loader: ConfigLoader) -> Self {
        self.config_loader = Some(loader);
        self
    }

    /// Build once, then serve and rebuild on every change until the process
    /// is stopped.
    ///
    /// Fails without serving anything if the initial build fails.
    pub async fn start(self) -> Result<(), ServerError> {
        let builder = Arc::new(StaticBuilder::new(self.config.build.clone()));

        tracing::info!("📦 Running initial build...");
        let result = run_build(&builder).await.map_err(|e| match e {
            ServerError::Build(e) => ServerError::InitialBuild(e),
            other => other,
        })?;
        log_build(&result);

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                ServerError::InvalidAddress(format!("{}:{}", self.config.host, self.config.port))
            })?;

        let hub = ReloadHub::new();

        let targets = WatchTargets::new(&self.config.build, self.config.config_file.clone());
        let (watcher, rx) =
            FileWatcher::new(&targets).map_err(|e| ServerError::WatchError(e.to_string()))?;

        let loop_builder = Arc::clone(&builder);
        let loop_loader = self.config_loader.clone();
        let loop_hub = hub.clone();
        tokio::spawn(async move {
            rebuild_loop(rx, loop_builder, loop_loader, loop_hub).await;
            // Keep watcher alive
            drop(watcher);
        });

        let state = Arc::new(ServerState::new(
            self.config.build.output_dir.clone(),
            hub,
        ));
        let app = router(state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        let url = format!("http://{}", addr);
        tracing::info!("✅ Development server running at {}", url);
        log_watch_targets(&targets);

        if self.config.open {
            let _ = open::that(&url);
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        Ok(())
    }
}

/// Build the router over an output directory.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(RELOAD_SOCKET_PATH, get(ws_handler))
        .route(RELOAD_SCRIPT_PATH, get(reload_script_handler))
        .fallback(page_handler)
        .with_state(state)
}

/// Consume watch events one at a time, running a full build for each.
///
/// A config file change first reloads the build settings through `loader`.
/// A failed rebuild is logged and the previous output keeps being served.
pub async fn rebuild_loop(
    mut rx: mpsc::Receiver<WatchEvent>,
    mut builder: Arc<StaticBuilder>,
    loader: Option<ConfigLoader>,
    hub: ReloadHub,
) {
    while let Some(event) = rx.recv().await {
        tracing::info!("📝 Changed: {}", event.path().display());

        if let (WatchEvent::Config(_), Some(load)) = (&event, &loader) {
            match load() {
                Ok(config) => builder = reconfigure(&builder, config),
                Err(e) => {
                    tracing::error!("{}", e);
                    tracing::error!("❌ Build failed - fix errors and save to retry");
                    continue;
                }
            }
        }

        tracing::info!("🔨 Rebuilding...");

        match run_build(&builder).await {
            Ok(result) => {
                log_build(&result);
                tracing::info!("♻️  Reloading browser...");
                hub.send(ReloadMessage::Reload);
            }
            Err(e) => {
                tracing::error!("{}", e);
                tracing::error!("❌ Build failed - fix errors and save to retry");
            }
        }
    }
}

/// Swap in a builder for reloaded settings.
///
/// The served and watched directories are fixed at startup, so path changes
/// only take effect after a restart.
fn reconfigure(current: &StaticBuilder, config: BuildConfig) -> Arc<StaticBuilder> {
    let old = current.config();
    let moved = old.output_dir != config.output_dir
        || old.content_dir != config.content_dir
        || old.templates_dir != config.templates_dir
        || old.styles_dir != config.styles_dir;

    if moved {
        tracing::warn!("Site paths changed; restart the dev server to serve and watch them");
    }

    tracing::info!("⚙️  Reloaded build settings");
    Arc::new(StaticBuilder::new(config))
}

/// Run a full build on the blocking pool and wait for it to finish.
async fn run_build(builder: &Arc<StaticBuilder>) -> Result<BuildResult, ServerError> {
    let builder = Arc::clone(builder);
    let result = tokio::task::spawn_blocking(move || builder.build())
        .await
        .map_err(|e| ServerError::BuildTask(e.to_string()))?;
    Ok(result?)
}

fn log_build(result: &BuildResult) {
    tracing::info!(
        "✨ Built {} pages in {}ms",
        result.pages,
        result.duration_ms
    );
}

fn log_watch_targets(targets: &WatchTargets) {
    tracing::info!("👀 Watching for changes...");
    tracing::info!("   - {}/**/*.json", targets.content_dir.display());
    tracing::info!("   - {}/**/*", targets.templates_dir.display());
    if let Some(styles) = &targets.styles_dir {
        tracing::info!("   - {}/**/*", styles.display());
    }
    if let Some(config) = &targets.config_file {
        tracing::info!("   - {}", config.display());
    }
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let rx = state.hub.subscribe();
    ws.on_upgrade(move |socket| handle_ws(socket, rx))
}

/// Forward reload messages to one browser until it disconnects.
async fn handle_ws(mut socket: WebSocket, mut rx: broadcast::Receiver<ReloadMessage>) {
    if send_message(&mut socket, &ReloadMessage::Connected)
        .await
        .is_err()
    {
        return;
    }

    loop {
        let msg = match rx.recv().await {
            Ok(msg) => msg,
            // Missed messages still mean the page is stale
            Err(broadcast::error::RecvError::Lagged(_)) => ReloadMessage::Reload,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if send_message(&mut socket, &msg).await.is_err() {
            break;
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handler for the reload client script.
async fn reload_script_handler() -> impl IntoResponse {
    (
        [("content-type", "application/javascript")],
        reload_client_script(),
    )
}

/// Serve built pages, with the reload script injected when live reload is
/// on; everything else is served straight from the output directory.
async fn page_handler(State(state): State<Arc<ServerState>>, req: Request) -> Response {
    if let Some(path) = resolve_page(&state.output_dir, req.uri().path()) {
        match tokio::fs::read_to_string(&path).await {
            Ok(html) if state.live_reload => {
                return Html(inject_reload_script(&html)).into_response()
            }
            Ok(html) => return Html(html).into_response(),
            Err(e) => tracing::warn!("Failed to read {}: {}", path.display(), e),
        }
    }

    match ServeDir::new(&state.output_dir).oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Map a request path to an HTML file in the output directory.
///
/// `/` and directories resolve to `index.html`, `/name` resolves to
/// `name.html` when that file exists, and `/name.html` to itself.
fn resolve_page(root: &Path, url_path: &str) -> Option<PathBuf> {
    let relative = Path::new(url_path.trim_start_matches('/'));

    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let target = root.join(relative);

    if target.is_dir() {
        let index = target.join("index.html");
        return index.is_file().then_some(index);
    }

    match target.extension() {
        Some(ext) if ext == "html" => target.is_file().then_some(target),
        Some(_) => None,
        None => {
            let mut with_ext = target.into_os_string();
            with_ext.push(".html");
            let page = PathBuf::from(with_ext);
            page.is_file().then_some(page)
        }
    }
}

/// Insert the reload script before `</body>`, or append it when the page has
/// no closing body tag.
fn inject_reload_script(html: &str) -> String {
    let tag = format!(r#"<script src="{RELOAD_SCRIPT_PATH}"></script>"#);

    match html.rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], tag, &html[pos..]),
        None => format!("{html}{tag}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request as HttpRequest, StatusCode};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn output() -> TempDir {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("index.html"), "<html><body>home</body></html>").unwrap();
        fs::write(temp.path().join("about.html"), "<p>about</p>").unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("css/main.css"), "body{}").unwrap();
        temp
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn app(root: &Path) -> Router {
        router(Arc::new(ServerState::new(root.to_path_buf(), ReloadHub::new())))
    }

    #[test]
    fn creates_server_with_default_config() {
        let server = DevServer::new(DevServerConfig::default());
        assert_eq!(server.config.port, 3000);
        assert_eq!(server.config.host, "127.0.0.1");
    }

    #[test]
    fn resolves_extensionless_paths() {
        let temp = output();
        let root = temp.path();

        assert_eq!(resolve_page(root, "/"), Some(root.join("index.html")));
        assert_eq!(resolve_page(root, "/about"), Some(root.join("about.html")));
        assert_eq!(resolve_page(root, "/about.html"), Some(root.join("about.html")));
        assert_eq!(resolve_page(root, "/missing"), None);
        assert_eq!(resolve_page(root, "/css/main.css"), None);
        assert_eq!(resolve_page(root, "/../etc/passwd"), None);
    }

    #[test]
    fn injects_script_before_body_close() {
        let html = inject_reload_script("<html><body>x</body></html>");
        assert_eq!(
            html,
            "<html><body>x<script src=\"/__reload.js\"></script></body></html>"
        );

        let fragment = inject_reload_script("<p>x</p>");
        assert_eq!(fragment, "<p>x</p><script src=\"/__reload.js\"></script>");
    }

    #[tokio::test]
    async fn serves_pages_with_reload_script() {
        let temp = output();

        let (status, body) = get_body(app(temp.path()), "/about").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("<p>about</p>"));
        assert!(body.contains("/__reload.js"));
    }

    #[tokio::test]
    async fn preview_serves_pages_untouched() {
        let temp = output();
        let app = router(Arc::new(ServerState::preview(temp.path().to_path_buf())));

        let (status, body) = get_body(app, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<html><body>home</body></html>");
    }

    #[tokio::test]
    async fn serves_assets_unchanged() {
        let temp = output();

        let (status, body) = get_body(app(temp.path()), "/css/main.css").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body{}");
    }

    #[tokio::test]
    async fn serves_reload_script() {
        let temp = output();

        let (status, body) = get_body(app(temp.path()), "/__reload.js").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("WebSocket"));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let temp = output();

        let (status, _) = get_body(app(temp.path()), "/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn site() -> TempDir {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(root, "templates/components/title.html", "<h1>{{ title }}</h1>");
        write(root, "templates/layouts/base.html", "<body>{{ body }}</body>");
        write(root, "templates/pages/landing-page.html", "{% include \"title\" %}");
        write(root, "templates/pages/home-page.html", "{% include \"title\" %}");
        write(root, "content/global/navigation.json", "[]");
        write(root, "content/global/footer.json", "{}");
        write(root, "content/pages/home.json", r#"{"title": "v1"}"#);
        temp
    }

    fn builder(root: &Path) -> Arc<StaticBuilder> {
        Arc::new(StaticBuilder::new(BuildConfig {
            content_dir: root.join("content"),
            templates_dir: root.join("templates"),
            output_dir: root.join("dist"),
            styles_dir: None,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn rebuilds_and_reloads_on_each_event() {
        let temp = site();
        let root = temp.path();
        let hub = ReloadHub::new();
        let mut reloads = hub.subscribe();
        let (tx, rx) = mpsc::channel(8);

        let task = tokio::spawn(rebuild_loop(rx, builder(root), None, hub.clone()));

        write(root, "content/pages/home.json", r#"{"title": "v2"}"#);
        tx.send(WatchEvent::Content(root.join("content/pages/home.json")))
            .await
            .unwrap();

        assert_eq!(reloads.recv().await.unwrap(), ReloadMessage::Reload);
        let index = fs::read_to_string(root.join("dist/index.html")).unwrap();
        assert_eq!(index, "<body><h1>v2</h1></body>");

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_last_output() {
        let temp = site();
        let root = temp.path();
        let builder = builder(root);
        builder.build().unwrap();

        let hub = ReloadHub::new();
        let mut reloads = hub.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(rebuild_loop(rx, builder, None, hub.clone()));

        write(root, "content/pages/home.json", "{ broken");
        tx.send(WatchEvent::Content(root.join("content/pages/home.json")))
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(reloads.try_recv().is_err());
        let index = fs::read_to_string(root.join("dist/index.html")).unwrap();
        assert_eq!(index, "<body><h1>v1</h1></body>");
    }

    fn site_config(root: &Path, standalone: &str) -> BuildConfig {
        BuildConfig {
            standalone_layouts: vec![standalone.to_string()],
            ..builder(root).config().clone()
        }
    }

    #[tokio::test]
    async fn config_change_reloads_build_settings() {
        let temp = site();
        let root = temp.path();
        write(root, "templates/pages/promo-page.html", "<main>{{ title }}</main>");
        write(root, "content/pages/promo.json", r#"{"title": "Promo", "layout": "promo-page"}"#);
        write(root, "site.conf", "landing-page-anduril");

        let conf = root.join("site.conf");
        let loader_root = root.to_path_buf();
        let loader: ConfigLoader = Arc::new(move || {
            let standalone = fs::read_to_string(&conf).map_err(|e| e.to_string())?;
            Ok(site_config(&loader_root, standalone.trim()))
        });

        let builder = builder(root);
        builder.build().unwrap();
        assert_eq!(
            fs::read_to_string(root.join("dist/promo.html")).unwrap(),
            "<body><h1>Promo</h1></body>"
        );

        let hub = ReloadHub::new();
        let mut reloads = hub.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(rebuild_loop(rx, builder, Some(loader), hub.clone()));

        write(root, "site.conf", "promo-page");
        tx.send(WatchEvent::Config(root.join("site.conf"))).await.unwrap();

        assert_eq!(reloads.recv().await.unwrap(), ReloadMessage::Reload);
        assert_eq!(
            fs::read_to_string(root.join("dist/promo.html")).unwrap(),
            "<main>Promo</main>"
        );

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn broken_config_skips_rebuild() {
        let temp = site();
        let root = temp.path();
        let builder = builder(root);
        builder.build().unwrap();

        let loader: ConfigLoader = Arc::new(|| Err("Failed to parse site.toml".to_string()));
        let hub = ReloadHub::new();
        let mut reloads = hub.subscribe();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(rebuild_loop(rx, builder, Some(loader), hub.clone()));

        write(root, "content/pages/home.json", r#"{"title": "v2"}"#);
        tx.send(WatchEvent::Config(root.join("site.toml"))).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert!(reloads.try_recv().is_err());
        let index = fs::read_to_string(root.join("dist/index.html")).unwrap();
        assert_eq!(index, "<body><h1>v1</h1></body>");
    }

    #[tokio::test]
    async fn failed_initial_build_aborts_startup() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let config = DevServerConfig {
            build: BuildConfig {
                content_dir: root.join("content"),
                templates_dir: root.join("templates"),
                output_dir: root.join("dist"),
                styles_dir: None,
                ..Default::default()
            },
            port: 0,
            open: false,
            ..Default::default()
        };

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            DevServer::new(config).start(),
        )
        .await
        .expect("startup should fail before serving");

        assert!(matches!(result, Err(ServerError::InitialBuild(_))));
        assert!(!root.join("dist").exists());
    }
}
