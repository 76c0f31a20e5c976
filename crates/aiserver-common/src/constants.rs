//! System-wide constants and defaults.

/// Prefix applied to every managed container name.
pub const CONTAINER_PREFIX: &str = "ai-";

/// Label carrying the owning module name.
pub const LABEL_MODULE: &str = "ai.module";

/// Label carrying the module type (`basic` or `feature`).
pub const LABEL_TYPE: &str = "ai.type";

/// Label carrying the SHA-256 fingerprint of the resolved manifest.
pub const LABEL_MANIFEST_HASH: &str = "ai.manifest-hash";

/// Shared bridge network all modules join.
pub const DEFAULT_NETWORK: &str = "ai-server-net";

/// Driver used when the shared network has to be created.
pub const DEFAULT_NETWORK_DRIVER: &str = "bridge";

/// Named volumes ensured before the first module start.
pub const DEFAULT_VOLUMES: &[&str] = &[
    "ai-server-mysql-data",
    "ai-server-redis-data",
    "ai-server-minio-data",
    "ai-server-es-data",
    "ai-server-postgres-data",
    "ai-server-logs",
];

/// Loopback bind used when neither module nor configuration specify one.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Template variable exposing the configured bind address.
pub const BIND_ADDRESS_VAR: &str = "BIND_ADDRESS";

/// Restart policy applied to created containers.
pub const DEFAULT_RESTART_POLICY: &str = "unless-stopped";

/// Registry hosts treated as the default public registry.
pub const DEFAULT_REGISTRY_HOSTS: &[&str] = &["docker.io", "index.docker.io", "registry-1.docker.io"];

/// Runtime event actions the status synchronizer reacts to.
pub const INTERESTING_EVENT_ACTIONS: &[&str] =
    &["start", "stop", "die", "restart", "health_status", "destroy"];

/// Container states folded into "stopped".
pub const STOPPED_STATES: &[&str] = &["exited", "created", "dead", "stopped", "paused"];

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV: &str = "AISRV_CONFIG";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "aisrv";
