//! Computation registry.
//!
//! Maps each [`ComputationKind`] to a handler plus its declared input and
//! output schemas. The registry holds no state beyond that mapping and is
//! shared by reference between the scheduler and any direct callers.
//!
//! Raw string arguments are checked against the input schema and decoded
//! into [`TaskArgs`] once, in [`ComputationRegistry::prepare`]. Handlers
//! only ever see the typed form.

pub mod schema;

pub use schema::{InputSchema, OutputSchema, ParamSpec, ParamType};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{HandlerError, OrchestratorError, Result};
use crate::types::args::TaskArgs;
use crate::types::kind::ComputationKind;
use crate::types::result::{ComputationOutput, ComputationResult};

/// A computation body.
///
/// Implementations must be deterministic with respect to their arguments,
/// except for kinds that are defined to read external data. Transient
/// failures of such reads are absorbed inside the handler; an `Err` means
/// no well-formed output could be produced at all.
#[async_trait]
pub trait ComputationHandler: Send + Sync {
    /// Produces the kind-specific output for `args`.
    async fn compute(&self, args: &TaskArgs) -> std::result::Result<ComputationOutput, HandlerError>;
}

struct Registration {
    handler: Arc<dyn ComputationHandler>,
    input: InputSchema,
    output: OutputSchema,
}

/// Kind → handler mapping.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use vcompute::config::OrchestratorConfig;
/// use vcompute::handlers::register_builtin_handlers;
/// use vcompute::registry::ComputationRegistry;
/// use vcompute::sources::{StaticOracleReader, StaticYieldSource};
///
/// # async fn example() -> vcompute::Result<()> {
/// let registry = ComputationRegistry::new();
/// register_builtin_handlers(
///     &registry,
///     &OrchestratorConfig::default(),
///     Arc::new(StaticYieldSource::new()),
///     Arc::new(StaticOracleReader::new()),
/// )?;
///
/// let args: Vec<String> = vec![
///     "0xstrategy".into(),
///     r#"["USDC","WETH"]"#.into(),
///     "0.3".into(),
///     "0.4".into(),
///     "0.25".into(),
/// ];
/// let result = registry.invoke("risk_scoring", &args).await?;
/// println!("{}", result.to_json());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ComputationRegistry {
    entries: DashMap<ComputationKind, Registration>,
}

impl std::fmt::Debug for ComputationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputationRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ComputationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`.
    ///
    /// Fails with [`OrchestratorError::DuplicateKind`] if `kind` already has
    /// a handler; the existing registration is left untouched.
    pub fn register(
        &self,
        kind: ComputationKind,
        handler: Arc<dyn ComputationHandler>,
        input: InputSchema,
        output: OutputSchema,
    ) -> Result<()> {
        match self.entries.entry(kind) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(OrchestratorError::DuplicateKind {
                kind: kind.as_str().to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Registration {
                    handler,
                    input,
                    output,
                });
                debug!(kind = %kind, "registered computation handler");
                Ok(())
            },
        }
    }

    /// Returns `true` if `kind` has a handler.
    pub fn contains(&self, kind: ComputationKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<ComputationKind> {
        ComputationKind::ALL
            .into_iter()
            .filter(|kind| self.entries.contains_key(kind))
            .collect()
    }

    /// Input schema declared for `kind`.
    pub fn input_schema(&self, kind: ComputationKind) -> Option<InputSchema> {
        self.entries.get(&kind).map(|entry| entry.input.clone())
    }

    /// Output schema declared for `kind`.
    pub fn output_schema(&self, kind: ComputationKind) -> Option<OutputSchema> {
        self.entries.get(&kind).map(|entry| entry.output.clone())
    }

    /// Resolves `kind`, validates `args` against its input schema, and
    /// decodes them.
    ///
    /// This is everything [`invoke`](Self::invoke) does before running the
    /// handler; the scheduler calls it at submission so rejected arguments
    /// never create a task.
    pub fn prepare(&self, kind: &str, args: &[String]) -> Result<(ComputationKind, TaskArgs)> {
        let parsed: ComputationKind = kind.parse()?;
        let entry = self
            .entries
            .get(&parsed)
            .ok_or_else(|| OrchestratorError::UnknownKind {
                kind: kind.to_string(),
            })?;
        entry.input.validate(parsed.as_str(), args)?;
        drop(entry);
        let decoded = TaskArgs::decode(parsed, args)?;
        Ok((parsed, decoded))
    }

    /// Validates, decodes, and runs the handler for `kind`.
    pub async fn invoke(&self, kind: &str, args: &[String]) -> Result<ComputationResult> {
        let (_, decoded) = self.prepare(kind, args)?;
        self.invoke_typed(&decoded).await
    }

    /// Runs the handler for already-decoded arguments.
    ///
    /// The output is checked against the kind's output schema before it is
    /// stamped into a [`ComputationResult`].
    pub async fn invoke_typed(&self, args: &TaskArgs) -> Result<ComputationResult> {
        let kind = args.kind();
        let (handler, output_schema) = {
            let entry = self
                .entries
                .get(&kind)
                .ok_or_else(|| OrchestratorError::UnknownKind {
                    kind: kind.as_str().to_string(),
                })?;
            (Arc::clone(&entry.handler), entry.output.clone())
        };

        let output = handler.compute(args).await?;
        if output.kind() != kind {
            return Err(HandlerError::ArgumentMismatch {
                expected: kind.as_str(),
                got: output.kind().as_str(),
            }
            .into());
        }

        let result = ComputationResult::new(output);
        output_schema.validate(&result.to_json())?;
        Ok(result)
    }
}
