#![forbid(unsafe_code)]

mod ids;
mod json;
mod rows;
mod schema;
mod time;
mod tx;

pub(super) use ids::*;
pub(super) use json::*;
pub(super) use rows::*;
pub(super) use schema::{install_schema, preflight_gate};
pub(super) use time::now_ms;
pub(super) use tx::*;
