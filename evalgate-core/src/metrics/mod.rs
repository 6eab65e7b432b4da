// Copyright 2025 Evalgate Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Built-in metric implementations.
//!
//! All built-ins are LLM-as-judge metrics: one generic [`JudgeMetric`]
//! instantiated with a per-metric rubric. The judge is asked for a JSON
//! verdict `{"score": <0..1>, "reason": "<text>"}`.

mod judge_metric;
mod rubrics;

pub use judge_metric::JudgeMetric;
pub use rubrics::register_builtins;
