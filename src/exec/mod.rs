// Query execution support module
//
// Turns compiled query shapes into per-row decisions: argument decoding
// normalizes user-supplied predicate arguments into lane-typed form once,
// the row-condition evaluator applies residual predicates under the row
// seqlock, and the specialization cache hands out one closure per
// (column, type-code, operation) so the hot path never re-dispatches on
// type.

pub mod args;
pub mod condition;
pub mod query;
pub mod specialize;

pub use args::{decode_arg, ArgValue, DecodedArg};
pub use condition::{decode_condition_args, CompiledCondition, Operator, RowPredicate};
pub use query::CompiledQuery;
pub use specialize::{
    FieldReader, ListScanner, RangeScanner, SpecOp, SpecializationCache, TargetResolver,
};
