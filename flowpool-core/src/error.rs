use thiserror::Error;

/// A malformed flow, step, resource or distribution configuration.
///
/// Configuration errors are detected before simulated time starts moving and
/// abort the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A distribution formula could not be parsed or has invalid parameters.
    #[error("invalid distribution `{formula}`: {reason}")]
    InvalidDistribution {
        /// The offending formula text.
        formula: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Two steps in one flow share an id.
    #[error("flow `{flow}`: duplicate step id `{step}`")]
    DuplicateStep {
        /// Flow id.
        flow: String,
        /// Duplicated step id.
        step: String,
    },
    /// Two flows share an id.
    #[error("duplicate flow id `{0}`")]
    DuplicateFlow(String),
    /// A next-step reference does not resolve inside the flow.
    #[error("flow `{flow}` step `{step}`: unknown next step `{target}`")]
    UnknownStep {
        /// Flow id.
        flow: String,
        /// Step holding the reference.
        step: String,
        /// Unresolved target id.
        target: String,
    },
    /// A step is missing a required sub-field or has one out of range.
    #[error("flow `{flow}` step `{step}`: {reason}")]
    InvalidStep {
        /// Flow id.
        flow: String,
        /// Step id.
        step: String,
        /// What is wrong with it.
        reason: String,
    },
    /// A requirement names a resource pool that is not configured.
    #[error("flow `{flow}` step `{step}`: unknown resource pool `{table}`/`{resource_type}`")]
    UnknownPool {
        /// Flow id.
        flow: String,
        /// Step id.
        step: String,
        /// Requested resource table.
        table: String,
        /// Requested resource type.
        resource_type: String,
    },
    /// A requirement names a queue that is not configured.
    #[error("flow `{flow}` step `{step}`: unknown queue `{queue}`")]
    UnknownQueue {
        /// Flow id.
        flow: String,
        /// Step id.
        step: String,
        /// Queue name.
        queue: String,
    },
    /// A resource pool or queue definition is invalid.
    #[error("resource configuration: {0}")]
    InvalidResource(String),
    /// Run-level settings are invalid.
    #[error("simulation configuration: {0}")]
    InvalidSimulation(String),
}

/// A table, column, foreign key or value could not be resolved at run time.
///
/// Resolution errors abort only the affected entity's current step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// The table is not part of the schema.
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    /// No foreign key on `child` references `parent`.
    #[error("no foreign key on `{child}` references `{parent}`")]
    MissingForeignKey {
        /// Table holding the foreign key.
        child: String,
        /// Referenced table.
        parent: String,
    },
    /// More than one foreign key on `child` references `parent`.
    #[error("ambiguous foreign key on `{child}` to `{parent}`: {candidates:?}")]
    AmbiguousForeignKey {
        /// Table holding the foreign keys.
        child: String,
        /// Referenced table.
        parent: String,
        /// Candidate columns.
        candidates: Vec<String>,
    },
    /// An expression could not be evaluated.
    #[error("cannot evaluate `{expression}`: {reason}")]
    Expression {
        /// Expression text.
        expression: String,
        /// Failure reason.
        reason: String,
    },
    /// The value generator failed for an attribute.
    #[error("cannot generate `{table}.{attribute}`: {reason}")]
    Generation {
        /// Target table.
        table: String,
        /// Target attribute.
        attribute: String,
        /// Failure reason.
        reason: String,
    },
    /// A sample had to be numeric but was not.
    #[error("non-numeric sample `{0}` where a number is required")]
    NonNumeric(String),
}

/// The persistence collaborator rejected a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sink error: {0}")]
pub struct SinkError(pub String);
