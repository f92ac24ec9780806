//! Template Generator & Code Generator Facade (spec.md §4.F, §4.G).
//!
//! Grounded on the teacher's `tools` crate (a static keyword-tagged
//! catalog, `crates/tools/src/lib.rs`) for the template generator, and
//! its `Agent::respond` orchestration (`crates/agent/src/agent.rs`) for
//! the facade's assemble-then-call-then-fallback shape.

pub mod facade;
pub mod template;

pub use facade::{CodeGeneratorFacade, ProviderGatewayLike, Script, ScriptSource};
pub use template::{TemplateGenerator, TemplateOutput};
