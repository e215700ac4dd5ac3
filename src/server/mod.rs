//! Server module: registry, dispatcher and the HTTP exposure built on them

pub mod builder;
pub mod dispatcher;
pub mod exposure;
pub mod host;
pub mod registry;

pub use builder::ServerBuilder;
pub use dispatcher::{
    DispatchBody, DispatchRequest, DispatchResponse, Dispatcher, InputRejection, Outcome,
};
pub use exposure::RestExposure;
pub use host::ServerHost;
pub use registry::{Registry, ResourceDescriptor, RouteDescriptor};
