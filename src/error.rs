// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy. Every fallible operation returns a `Result`; the middleware
// must stay usable after any local failure, so nothing here unwinds past the
// caller. Loan failures and full queues are retry-by-design; creation-time
// incompatibilities are configuration faults for the operator to fix.

use std::io;

use thiserror::Error;

use crate::service_name::NameError;

/// Failures while building a node, service, publisher, or subscriber.
#[derive(Debug, Error)]
pub enum CreationError {
    #[error("invalid service name: {0}")]
    InvalidName(#[from] NameError),
    #[error("invalid payload descriptor: {0}")]
    InvalidDescriptor(&'static str),
    #[error("invalid service configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("service exists with an incompatible payload descriptor")]
    IncompatibleService,
    #[error("service exists with an incompatible configuration")]
    IncompatibleConfig,
    #[error("service registry is full")]
    RegistryFull,
    #[error("service data segment was never initialised by its creator")]
    ServiceUninitialised,
    #[error("service already has the maximum number of publishers")]
    ExceedsMaxPublishers,
    #[error("service already has the maximum number of subscribers")]
    ExceedsMaxSubscribers,
    #[error("service already has the maximum number of attached nodes")]
    ExceedsMaxAttachments,
    #[error("shared memory error: {0}")]
    Segment(#[from] io::Error),
}

/// Failures while loaning a writable sample chunk from the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoanError {
    /// The arena has no free chunk. Retry after releasing samples.
    #[error("arena is out of chunks")]
    OutOfMemory,
    /// This publisher already holds its maximum number of unsent loans.
    #[error("publisher exceeds its maximum number of loaned samples")]
    ExceedsMaxLoans,
    /// More elements requested than the service's configured maximum.
    #[error("loan of {requested} elements exceeds the maximum of {max}")]
    ExceedsMaxLoanSize { requested: usize, max: usize },
}

/// Failures while sending a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The service's backing segment was torn down mid-send.
    #[error("service was torn down")]
    ServiceTornDown,
    /// Loaning the chunk failed (copy-style send paths only).
    #[error("loan failed: {0}")]
    Loan(#[from] LoanError),
}

/// Failures while receiving a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReceiveError {
    /// The service's backing segment was torn down.
    #[error("service was torn down")]
    ServiceTornDown,
}

/// Failures of the node's cooperative wait primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    /// A process termination signal (SIGINT/SIGTERM) was observed.
    #[error("wait interrupted by a termination signal")]
    Interrupted,
}
