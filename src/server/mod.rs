pub mod builder;
pub mod handler;
pub mod listener;
pub mod router;

pub use builder::{Server, ServerBuilder};
pub use handler::RequestHandler;
pub use router::{RouteMatch, RoutingTable};
