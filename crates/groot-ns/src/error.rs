// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Setup errors. The coordinator is fail-fast: every error here ends up as
//! a single diagnostic line and a non-zero exit.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum NsError {
    #[error("{msg}: {source}")]
    Os {
        msg: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Setup(String),
}

impl NsError {
    pub fn os(msg: impl Into<String>, source: io::Error) -> NsError {
        NsError::Os {
            msg: msg.into(),
            source,
        }
    }

    pub fn msg(msg: impl Into<String>) -> NsError {
        NsError::Setup(msg.into())
    }
}
