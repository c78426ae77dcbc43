//! Facts: immutable typed tuples of values

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use sift_types::Value;
use std::fmt;
use std::ops::Index;

/// Integer tag identifying a fact type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(pub u32);

impl FactId {
    /// Position of this type's store inside the fact base
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable tuple of values tagged with its fact type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    fact_type: FactId,
    args: Box<[Value]>,
}

impl Fact {
    pub fn new(fact_type: FactId, args: impl Into<Box<[Value]>>) -> Self {
        Self { fact_type, args: args.into() }
    }

    pub fn fact_type(&self) -> FactId {
        self.fact_type
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Checked field access
    pub fn field(&self, index: usize) -> EngineResult<&Value> {
        self.args
            .get(index)
            .ok_or(EngineError::FieldOutOfRange { index, arity: self.args.len() })
    }
}

impl Index<usize> for Fact {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.args[index]
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}(", self.fact_type)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}
