//! Silicon model for the phnsw HNSW graph-search accelerator.
//!
//! This crate has **no dependencies** and **no behavior**. It is a pure
//! model of the accelerator as programs see it: the register catalog, the
//! opcode table (destinations and pipeline depth per mnemonic) and the
//! scratchpad / backing-memory address layout.
//!
//! Programs written against the catalog and layout in here must keep
//! working unchanged, so every name and constant is part of the contract.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`catalog`] | Register names, widths, groups; list capacities |
//! | [`isa`] | Opcode mnemonics, destination registers, pipeline depths |
//! | [`layout`] | SPM / memory base offsets, node record sizes |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod isa;
pub mod layout;
