//! Request logging hooked into the SDK orchestrator.

use aws_sdk_s3::config::interceptors::{
    BeforeTransmitInterceptorContextRef, FinalizerInterceptorContextRef,
};
use aws_sdk_s3::config::{ConfigBag, Intercept, RuntimeComponents};
use aws_sdk_s3::error::BoxError;

use crate::TRACING_TARGET_CLIENT;

/// Logs every request attempt and its response status at `DEBUG`.
///
/// Only header names are logged.
#[derive(Debug, Default)]
pub(super) struct VerboseLogging;

impl Intercept for VerboseLogging {
    fn name(&self) -> &'static str {
        "ExtstoreVerboseLogging"
    }

    fn read_before_transmit(
        &self,
        context: &BeforeTransmitInterceptorContextRef<'_>,
        _runtime_components: &RuntimeComponents,
        _cfg: &mut ConfigBag,
    ) -> Result<(), BoxError> {
        let request = context.request();
        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            method = request.method(),
            uri = request.uri(),
            headers = ?request.headers().iter().map(|(name, _)| name).collect::<Vec<_>>(),
            "sending s3 request"
        );
        Ok(())
    }

    fn read_after_attempt(
        &self,
        context: &FinalizerInterceptorContextRef<'_>,
        _runtime_components: &RuntimeComponents,
        _cfg: &mut ConfigBag,
    ) -> Result<(), BoxError> {
        let status = context.response().map(|response| response.status().as_u16());
        tracing::debug!(
            target: TRACING_TARGET_CLIENT,
            status = ?status,
            "s3 request attempt finished"
        );
        Ok(())
    }
}
