/// tidegate - multi-tenant SQL database proxy
///
/// The crate carries the backend transport layer of the proxy: a read-buffered
/// stream wrapper, the length-prefixed sequence-numbered packet codec, and the
/// backend connection lifecycle. Namespace and process configuration, and the
/// configuration centers that supply namespaces, feed the transport with
/// backend addresses.
pub mod backend;
pub mod config;
pub mod configcenter;
pub mod error;
pub mod logging;
pub mod net;

pub use backend::{BackendConnection, BackendConnectionImpl, ConnectionPhase, DIAL_TIMEOUT};
pub use config::{Namespace, ProxyConfig};
pub use configcenter::{create_config_center, ConfigCenter};
pub use error::{ConfigError, ErrorSeverity, TidegateError, TidegateResult};
pub use net::{BufferedReadConn, PacketIo, MAX_PAYLOAD_LEN};
