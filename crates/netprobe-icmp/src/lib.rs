//! ICMP echo probing and hop tracing.

mod echo;
pub mod matcher;
pub mod packet;
mod session;
mod trace;

pub use echo::EchoProber;
pub use packet::{decode, encode, EchoKind, EchoMessage, IcmpMessage};
#[cfg(unix)]
pub use session::RawSocketSession;
pub use session::RawSessionFactory;
pub use trace::HopTracer;

/// Echo identifier for this process.
///
/// Concurrent probes within the process share it; replies are told apart by
/// source address and sequence number.
pub fn process_identifier() -> u16 {
    // Truncation is fine, the identifier only has to be stable per process
    (std::process::id() & 0xffff) as u16
}
