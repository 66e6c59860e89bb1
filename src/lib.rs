// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod ast;
mod cast_graph;
mod catalog;
mod config;
mod datum;
mod decimal;
mod error;
mod event;
mod format;
mod frontend;
mod lexer;
mod marker;
mod mask;
mod name_map;
mod parser;
mod restore;
mod session;
mod stats;
mod time;
mod types;
mod visitor;

pub use catalog::ConstraintFilter;
pub use config::{read_scripts, Config, MaskSettings, DEFAULT_KEY};
pub use datum::Datum;
pub use error::{MaskError, Outcome};
pub use event::{Event, Param, Payload};
pub use frontend::{Context, FrontEnd, Instance, Script};
pub use mask::{list as mask_functions, MaskFuncEntry, MaskKey};
pub use name_map::{generate as generate_name_map, NameMap};
pub use session::{Prepared, Session};
pub use stats::Stats;
pub use types::{FieldType, TypeCode};

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::ast::*;
    pub use crate::cast_graph::*;
    pub use crate::decimal::*;
    pub use crate::format::*;
    pub use crate::lexer::*;
    pub use crate::marker::*;
    pub use crate::parser::*;
    pub use crate::restore::*;
    pub use crate::time::*;
    pub use crate::visitor::*;
}
