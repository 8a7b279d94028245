//! # NMFit Core Library
//!
//! An engine for iterative normal-mode flexible fitting: refining a molecular
//! conformation against a target AFM height-map image by alternating a
//! normal-mode perturbation step with an image-similarity scoring step.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to keep the
//! numerical search logic separate from the external tooling it drives.
//!
//! - **[`core`]: The Foundation.** Stateless data models and pure math: the
//!   `HeightMap` image type and its similarity oracle, least-squares fitting
//!   kernels, and height-map I/O.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer holds the run
//!   configuration, the sensitivity sweep, the mode-selection and termination
//!   policies, the append-only trajectory log, and the trait seams through
//!   which external collaborators (mode solver, image renderer, structural
//!   aligner) are consumed.
//!
//! - **[`workflows`]: The Public API.** High-level entry points that tie the
//!   engine together: [`workflows::refine`] drives the adaptive iteration
//!   loop, and [`workflows::analyze`] locates the best iteration of a
//!   completed run from its trajectory.

pub mod core;
pub mod engine;
pub mod workflows;
