//! Payment gate: inbound classification and response emission.
//!
//! The gate is a pair of cooperating steps. [`classify`] inspects an inbound
//! request for an `X-PAYMENT` header and routes it to exactly one of two
//! branches. [`ResponseEmitter`] answers the request, either with a 402
//! challenge or with a success body that may carry an `X-PAYMENT-RESPONSE`
//! settlement header.

mod classifier;
mod emitter;

pub use classifier::{
    Classification, REQUIRED_PAYMENT_FIELDS, classify, classify_json, parse_payment_header,
};
pub use emitter::{
    ChallengeConfig, EmittedResponse, EmitterError, ResponseData, ResponseEmitter, ResponseMode,
    SettlementInfo, SuccessConfig,
};
