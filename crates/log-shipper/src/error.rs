// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::logs::signer::SignError;

/// Errors that can occur while starting the log shipping pipeline
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Signer(#[from] SignError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Sender task is not running")]
    NotRunning,
}
