// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod executor;

pub use executor::{Executor, ToolImplementation};

pub use builtin::calculator::CalculatorTool;
pub use builtin::internet_search::InternetSearchTool;
pub use builtin::python_evaluator::PythonEvaluatorTool;
pub use builtin::wikipedia_lookup::WikipediaLookupTool;
