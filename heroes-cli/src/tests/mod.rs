//! Shared test harness modules for the heroes CLI.

use super::*;

mod helpers;
