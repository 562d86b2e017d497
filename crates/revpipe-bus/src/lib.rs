pub mod envelope;
pub mod error;
pub mod inbox;
pub mod memory;
pub mod messages;
pub mod publisher;
pub mod registry;
pub mod transport;

pub use envelope::Envelope;
pub use error::BusError;
pub use inbox::{InboxEntry, InboxStore};
pub use memory::{InMemoryInbox, InMemoryTransport};
pub use messages::{
    BusMessage, MessageKind, ReviewMessage, ReviewReceivedMessage, ReviewSummaryMessage,
    RoutingKeys,
};
pub use publisher::EventPublisher;
pub use registry::{Consumer, ConsumerRegistry, RouteOutcome};
pub use transport::BusTransport;
