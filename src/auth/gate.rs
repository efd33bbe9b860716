// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tower layer that puts a route behind a permission check.
//!
//! Built by [`PermissionEvaluator::wrap`]. Attach it with `route_layer` so it
//! runs after routing, when the `userID` path parameter is known.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    extract::{FromRequestParts, RawPathParams, Request},
    response::{IntoResponse, Response},
};
use tower::{Layer, Service};

use super::middleware::principal_of;
use super::permissions::{AccessContext, Permission, PermissionEvaluator, TARGET_USER_PARAM};
use super::AuthError;

#[derive(Clone)]
pub struct PermissionLayer {
    evaluator: Arc<PermissionEvaluator>,
    required: Arc<[Permission]>,
}

impl PermissionLayer {
    pub(crate) fn new(evaluator: Arc<PermissionEvaluator>, required: &[Permission]) -> Self {
        Self {
            evaluator,
            required: required.into(),
        }
    }

    pub fn required(&self) -> &[Permission] {
        &self.required
    }
}

impl<S> Layer<S> for PermissionLayer {
    type Service = PermissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PermissionService {
            inner,
            evaluator: self.evaluator.clone(),
            required: self.required.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PermissionService<S> {
    inner: S,
    evaluator: Arc<PermissionEvaluator>,
    required: Arc<[Permission]>,
}

impl<S> Service<Request> for PermissionService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // Keep the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let evaluator = self.evaluator.clone();
        let required = self.required.clone();

        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            let principal = principal_of(&parts.extensions);
            let params = RawPathParams::from_request_parts(&mut parts, &()).await.ok();
            let target = params.as_ref().and_then(|params| {
                params
                    .iter()
                    .find(|(name, _)| *name == TARGET_USER_PARAM)
                    .map(|(_, value)| value)
            });

            let ctx = AccessContext {
                principal: &principal,
                target_user_id: target,
            };
            if !evaluator.check(&ctx, &required).await {
                tracing::info!(
                    principal = %principal,
                    path = %parts.uri.path(),
                    "Permission denied"
                );
                return Ok(AuthError::PermissionDenied.into_response());
            }

            inner.call(Request::from_parts(parts, body)).await
        })
    }
}
