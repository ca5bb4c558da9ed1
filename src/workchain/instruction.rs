//! The declarative outline DSL: `Block`, `If`/`elif`/`else`, `While`, and
//! `Return`, plus the leaf unit, `FunctionCall`.

/// One instruction in a compiled workchain outline. The tree is class-level
/// and immutable; only a [`super::stepper::Stepper`]'s cursor into it is
/// persisted (see `LoadContext::outline`).
#[derive(Clone, Debug)]
pub enum Instruction {
    /// Invoke the named step function once.
    FunctionCall(String),
    /// Sequential composition.
    Block(Vec<Instruction>),
    /// `if pred1 { body1 } elif pred2 { body2 } ... else { body }`. First
    /// true predicate wins; predicates are step names resolved against the
    /// workchain's predicate registry.
    If {
        branches: Vec<(String, Instruction)>,
        else_branch: Option<Box<Instruction>>,
    },
    /// `while pred { body }`.
    While { predicate: String, body: Box<Instruction> },
    /// Unwinds the whole outline, producing a terminal result carrying the
    /// given exit code.
    Return(Option<i32>),
}

impl Instruction {
    pub fn block(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        Instruction::Block(instructions.into_iter().collect())
    }

    pub fn if_(predicate: impl Into<String>, body: Instruction) -> IfBuilder {
        IfBuilder {
            branches: vec![(predicate.into(), body)],
            else_branch: None,
        }
    }

    pub fn while_(predicate: impl Into<String>, body: Instruction) -> Self {
        Instruction::While {
            predicate: predicate.into(),
            body: Box::new(body),
        }
    }

    pub fn call(step: impl Into<String>) -> Self {
        Instruction::FunctionCall(step.into())
    }
}

/// Fluent builder for `if [elif]* [else]`.
pub struct IfBuilder {
    branches: Vec<(String, Instruction)>,
    else_branch: Option<Box<Instruction>>,
}

impl IfBuilder {
    pub fn elif(mut self, predicate: impl Into<String>, body: Instruction) -> Self {
        self.branches.push((predicate.into(), body));
        self
    }

    pub fn else_(mut self, body: Instruction) -> Self {
        self.else_branch = Some(Box::new(body));
        self
    }

    pub fn build(self) -> Instruction {
        Instruction::If {
            branches: self.branches,
            else_branch: self.else_branch,
        }
    }
}
