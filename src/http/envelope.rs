use crate::error::ApiError;
use crate::types::RateQuota;
use serde::de::DeserializeOwned;

/// Capability every response type offers to the dispatcher.
pub trait ResponseEnvelope {
    type Body: DeserializeOwned;

    fn set_quota(&mut self, quota: RateQuota);
    fn set_error(&mut self, error: ApiError);
    /// Slot the success body is decoded into. `None` means the body carries
    /// nothing of interest and is not read as JSON at all.
    fn body_slot(&mut self) -> Option<&mut Option<Self::Body>>;
}

/// Envelope that decodes the success body into `T`.
#[derive(Debug, Clone)]
pub struct RestResponse<T> {
    /// Zero if the exchange never reached the server.
    pub quota: RateQuota,
    /// Only set when the server answered with a decodable non-success body.
    pub error: Option<ApiError>,
    pub value: Option<T>,
}

impl<T> Default for RestResponse<T> {
    fn default() -> Self {
        Self {
            quota: RateQuota::default(),
            error: None,
            value: None,
        }
    }
}

impl<T: DeserializeOwned> ResponseEnvelope for RestResponse<T> {
    type Body = T;

    fn set_quota(&mut self, quota: RateQuota) {
        self.quota = quota;
    }

    fn set_error(&mut self, error: ApiError) {
        self.error = Some(error);
    }

    fn body_slot(&mut self) -> Option<&mut Option<T>> {
        Some(&mut self.value)
    }
}

/// Envelope for delete/unlist style calls whose body is ignored.
#[derive(Debug, Clone, Default)]
pub struct EmptyResponse {
    pub quota: RateQuota,
    pub error: Option<ApiError>,
}

impl ResponseEnvelope for EmptyResponse {
    type Body = serde::de::IgnoredAny;

    fn set_quota(&mut self, quota: RateQuota) {
        self.quota = quota;
    }

    fn set_error(&mut self, error: ApiError) {
        self.error = Some(error);
    }

    fn body_slot(&mut self) -> Option<&mut Option<Self::Body>> {
        None
    }
}
