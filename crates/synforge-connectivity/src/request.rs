// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Connection requests and validated projections.

A [`ConnectionRequest`] is immutable once built. A [`Projection`] pairs it with
the connector that realises it, and only exists once the connector has
accepted the request.
*/

use std::sync::Arc;

use crate::cache::ContextKey;
use crate::connectivity::Connector;
use crate::parameters::ParameterDescriptor;
use crate::population::Population;
use crate::types::{ConnectivityError, ConnectivityResult};

/// Everything a connector needs to know about one projection
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    id: u32,
    pre: Arc<Population>,
    post: Arc<Population>,
    receptor_type: String,
    synapse_type: u8,
    weights: ParameterDescriptor,
    delays: ParameterDescriptor,
    time_step_ms: f64,
}

impl ConnectionRequest {
    pub fn builder(
        id: u32,
        pre: Arc<Population>,
        post: Arc<Population>,
    ) -> ConnectionRequestBuilder {
        ConnectionRequestBuilder {
            id,
            pre,
            post,
            receptor_type: None,
            weights: ParameterDescriptor::Fixed(1.0),
            delays: ParameterDescriptor::Fixed(1.0),
            time_step_ms: 1.0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn pre(&self) -> &Population {
        &self.pre
    }

    pub fn post(&self) -> &Population {
        &self.post
    }

    pub fn n_pre(&self) -> u32 {
        self.pre.n_atoms()
    }

    pub fn n_post(&self) -> u32 {
        self.post.n_atoms()
    }

    /// Source and target are the same population
    pub fn is_recurrent(&self) -> bool {
        Arc::ptr_eq(&self.pre, &self.post) || self.pre.id == self.post.id
    }

    pub fn receptor_type(&self) -> &str {
        &self.receptor_type
    }

    pub fn synapse_type(&self) -> u8 {
        self.synapse_type
    }

    pub fn weights(&self) -> &ParameterDescriptor {
        &self.weights
    }

    pub fn delays(&self) -> &ParameterDescriptor {
        &self.delays
    }

    pub fn time_step_ms(&self) -> f64 {
        self.time_step_ms
    }

    /// Delay in whole time steps, never below one step
    pub fn delay_steps(&self, delay_ms: f64) -> u32 {
        let steps = (delay_ms / self.time_step_ms).round();
        if steps >= u32::MAX as f64 {
            u32::MAX
        } else if steps >= 1.0 {
            steps as u32
        } else {
            1
        }
    }

    /// Total pre x post pairs, used to share the failure chance of a bound
    pub fn n_pairs(&self) -> u64 {
        u64::from(self.n_pre()) * u64::from(self.n_post())
    }

    pub fn context_key(&self) -> ContextKey {
        ContextKey::from_parts(&[
            u64::from(self.id),
            u64::from(self.pre.id),
            u64::from(self.post.id),
        ])
    }
}

/// Builder for [`ConnectionRequest`]
#[derive(Debug, Clone)]
pub struct ConnectionRequestBuilder {
    id: u32,
    pre: Arc<Population>,
    post: Arc<Population>,
    receptor_type: Option<String>,
    weights: ParameterDescriptor,
    delays: ParameterDescriptor,
    time_step_ms: f64,
}

impl ConnectionRequestBuilder {
    pub fn receptor(mut self, receptor_type: &str) -> Self {
        self.receptor_type = Some(receptor_type.to_string());
        self
    }

    pub fn weights(mut self, weights: ParameterDescriptor) -> Self {
        self.weights = weights;
        self
    }

    pub fn delays(mut self, delays: ParameterDescriptor) -> Self {
        self.delays = delays;
        self
    }

    pub fn time_step_ms(mut self, time_step_ms: f64) -> Self {
        self.time_step_ms = time_step_ms;
        self
    }

    pub fn build(self) -> ConnectivityResult<ConnectionRequest> {
        let receptor_type = self.receptor_type.ok_or_else(|| {
            ConnectivityError::InvalidParameter("connection request needs a receptor type".into())
        })?;
        let synapse_type = self.post.require_synapse_id(&receptor_type)?;
        self.weights.validate("weights")?;
        self.delays.validate("delays")?;
        if self.delays.min() < 0.0 {
            return Err(ConnectivityError::InvalidParameter(format!(
                "delays {:?} must not be negative",
                self.delays
            )));
        }
        if !(self.time_step_ms.is_finite() && self.time_step_ms > 0.0) {
            return Err(ConnectivityError::InvalidParameter(format!(
                "time step {} ms must be positive",
                self.time_step_ms
            )));
        }
        Ok(ConnectionRequest {
            id: self.id,
            pre: self.pre,
            post: self.post,
            receptor_type,
            synapse_type,
            weights: self.weights,
            delays: self.delays,
            time_step_ms: self.time_step_ms,
        })
    }
}

/// A request together with the connector that realises it
#[derive(Debug)]
pub struct Projection {
    request: ConnectionRequest,
    connector: Box<dyn Connector>,
}

impl Projection {
    /// Validates the request against the connector; nothing is built on failure
    pub fn new(
        request: ConnectionRequest,
        connector: impl Connector + 'static,
    ) -> ConnectivityResult<Self> {
        Self::from_boxed(request, Box::new(connector))
    }

    pub fn from_boxed(
        request: ConnectionRequest,
        connector: Box<dyn Connector>,
    ) -> ConnectivityResult<Self> {
        connector.validate(&request)?;
        Ok(Self { request, connector })
    }

    pub fn request(&self) -> &ConnectionRequest {
        &self.request
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// Split borrow for queries that fill connector caches
    pub fn parts_mut(&mut self) -> (&ConnectionRequest, &mut dyn Connector) {
        (&self.request, self.connector.as_mut())
    }

    /// Clear connector caches before a rebuild
    pub fn invalidate(&mut self) {
        self.connector.invalidate();
    }
}
