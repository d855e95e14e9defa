//! Default configuration values

/// Project manifest file name
pub const MANIFEST_FILE: &str = "bundlerig.toml";

/// Directory (relative to the project root) holding all bundle output
pub const BASE_DIR: &str = ".bundlerig";

/// Subdirectory of [`BASE_DIR`] for non-UI build output
pub const BUILD_SUBDIR: &str = "build";

/// Subdirectory of [`BASE_DIR`] for renderer output
pub const RENDERER_SUBDIR: &str = "renderer";

/// Host dev servers bind to
pub const DEFAULT_DEV_HOST: &str = "localhost";

/// Port assumed for a renderer whose dev server port is not yet resolved
pub const DEFAULT_DEV_PORT: u16 = 5173;

/// Upper bound for closing a single watcher or dev server during teardown
pub const CLOSE_TIMEOUT_MS: u64 = 5_000;

/// How long a dev server may take to report its URL
pub const LISTEN_TIMEOUT_MS: u64 = 30_000;

/// Total time budget for the dev server readiness probe
pub const READINESS_BUDGET_MS: u64 = 10_000;

/// Line marking the end of a watch build's first pass
pub const DEFAULT_READY_PATTERN: &str = r"(?i)built in";

/// Line carrying a dev server URL; the first capture group is the port
pub const DEFAULT_URL_PATTERN: &str = r"https?://(?:\[[0-9A-Fa-f:]+\]|[A-Za-z0-9.\-]+):(\d{1,5})";

/// Prefix shared by the environment variables handed to bundler commands
pub const ENV_PREFIX: &str = "BUNDLERIG";
