/// Shared names used on both the serving side and the client side

/// Default route prefix every API is mounted under
pub const RESI_ROUTE: &str = "resi";

/// Response field carrying a refreshed sealed token
pub const AUTH_TOKEN_FIELD: &str = "auth_token";

/// Request body field holding positional arguments
pub const ARGS_FIELD: &str = "args";

/// API and handler name of the development-only client builder route
pub const BUILD_CLIENT_API: &str = "clientBuilder";
pub const BUILD_CLIENT_FUNCTION: &str = "build";

/// Output directories written by the client builder
pub const API_DIRECTORY: &str = "apis";
pub const MODELS_DIRECTORY: &str = "models";

/// Name of the synthesized index module
pub const INDEX_FILE: &str = "index.js";

/// Storage key of the persisted bearer token on the client side
pub const TOKEN_KEY: &str = "@resi-token";
