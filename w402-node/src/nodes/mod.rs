//! Workflow nodes.
//!
//! | Node | Type name |
//! |---|---|
//! | [`RequestNode`] | `x402HttpRequest` |
//! | [`EndpointNode`] | `x402HttpEndpoint` |
//! | [`ResponseNode`] | `x402HttpResponse` |
//! | [`Erc3009Node`] | `erc3009Signer` |
//! | [`Eip712Node`] | `eip712Signer` |
//! | [`FacilitatorNode`] | `x402Facilitator` |

mod eip712;
mod endpoint;
mod erc3009;
mod facilitator;
mod request;
mod response;

pub use eip712::Eip712Node;
pub use endpoint::{EndpointNode, MISSING_PAYMENT_OUTPUT, PAYMENT_PROVIDED_OUTPUT};
pub use erc3009::Erc3009Node;
pub use facilitator::{FACILITATOR_CREDENTIAL, FacilitatorNode};
pub use request::RequestNode;
pub use response::ResponseNode;
