//! Structural validation of UDF calling conventions.
//!
//! A legal signature is an optional leading context parameter, zero or more
//! fixed parameters, and an optional trailing variadic parameter, returning
//! either a bare value or a value-or-error.

use std::fmt;

use sfq_common::{Result, SfqError};
use sfq_types::ValueType;

/// One declared parameter slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Processing context handle.
    Context,
    /// Fixed parameter coerced to the given type.
    Value(ValueType),
    /// Trailing variadic parameter; every remaining argument coerces to the element type.
    Variadic(ValueType),
    /// Parameter type outside the coercible set (named for diagnostics).
    Unsupported(String),
}

/// Declared return slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnKind {
    /// No return value.
    Nothing,
    /// Bare value.
    Value(ValueType),
    /// Value paired with an error channel.
    ValueOrError(ValueType),
    /// Error channel without a value.
    ErrorOnly,
    /// Return type outside the coercible set.
    Unsupported(String),
}

/// Parameter and return slots of a candidate function, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredShape {
    /// Parameters in declaration order.
    pub params: Vec<ParamKind>,
    /// Return slot.
    pub ret: ReturnKind,
}

/// Legal return shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    /// The function always produces a value.
    Bare(ValueType),
    /// The function may report failure.
    Fallible(ValueType),
}

impl ReturnShape {
    /// Declared value type regardless of the error channel.
    pub fn value_type(&self) -> &ValueType {
        match self {
            ReturnShape::Bare(t) | ReturnShape::Fallible(t) => t,
        }
    }
}

/// The eight legal parameter layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureForm {
    /// `(ctx)`
    ContextOnly,
    /// `()`
    NoParameters,
    /// `(ctx, a, b, ...)`
    ContextFixed,
    /// `(a, b, ...)`
    Fixed,
    /// `(ctx, ...rest)`
    ContextVariadic,
    /// `(...rest)`
    Variadic,
    /// `(ctx, a, ..., ...rest)`
    ContextFixedVariadic,
    /// `(a, ..., ...rest)`
    FixedVariadic,
}

/// Validated signature; built once per function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Whether the context is passed as the first parameter.
    pub has_context: bool,
    /// Fixed parameter types in order (context excluded).
    pub fixed: Vec<ValueType>,
    /// Variadic element type, when the last parameter is variadic.
    pub variadic: Option<ValueType>,
    /// Return shape.
    pub returns: ReturnShape,
}

impl FunctionSignature {
    /// Which of the eight legal layouts this signature uses.
    pub fn form(&self) -> SignatureForm {
        match (self.has_context, !self.fixed.is_empty(), self.variadic.is_some()) {
            (true, false, false) => SignatureForm::ContextOnly,
            (false, false, false) => SignatureForm::NoParameters,
            (true, true, false) => SignatureForm::ContextFixed,
            (false, true, false) => SignatureForm::Fixed,
            (true, false, true) => SignatureForm::ContextVariadic,
            (false, false, true) => SignatureForm::Variadic,
            (true, true, true) => SignatureForm::ContextFixedVariadic,
            (false, true, true) => SignatureForm::FixedVariadic,
        }
    }

    /// Arity predicate; the context slot does not count.
    pub fn accepts(&self, arity: usize) -> bool {
        if self.variadic.is_some() {
            arity >= self.fixed.len()
        } else {
            arity == self.fixed.len()
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if !std::mem::take(&mut first) {
                f.write_str(", ")?;
            }
            Ok(())
        };
        if self.has_context {
            sep(f)?;
            f.write_str("ctx")?;
        }
        for t in &self.fixed {
            sep(f)?;
            write!(f, "{t}")?;
        }
        if let Some(t) = &self.variadic {
            sep(f)?;
            write!(f, "...{t}")?;
        }
        match &self.returns {
            ReturnShape::Bare(t) => write!(f, ") -> {t}"),
            ReturnShape::Fallible(t) => write!(f, ") -> {t} or error"),
        }
    }
}

/// Classify `shape` into a legal signature or reject it with `SfqError::Signature`.
pub fn validate(shape: &DeclaredShape) -> Result<FunctionSignature> {
    let mut has_context = false;
    let mut fixed = Vec::new();
    let mut variadic: Option<ValueType> = None;

    for (pos, param) in shape.params.iter().enumerate() {
        match param {
            ParamKind::Context if pos == 0 => has_context = true,
            ParamKind::Context => {
                return Err(SfqError::Signature(format!(
                    "context parameter must be first, found at position {pos}"
                )));
            }
            ParamKind::Value(t) => {
                if variadic.is_some() {
                    return Err(SfqError::Signature(format!(
                        "parameter {pos} ({t}) follows the variadic parameter; variadic must be last"
                    )));
                }
                fixed.push(t.clone());
            }
            ParamKind::Variadic(t) => {
                if variadic.is_some() {
                    return Err(SfqError::Signature(format!(
                        "second variadic parameter at position {pos}; at most one is allowed"
                    )));
                }
                variadic = Some(t.clone());
            }
            ParamKind::Unsupported(name) => {
                return Err(SfqError::Signature(format!(
                    "unsupported parameter type {name} at position {pos}"
                )));
            }
        }
    }

    let returns = match &shape.ret {
        ReturnKind::Value(t) => ReturnShape::Bare(t.clone()),
        ReturnKind::ValueOrError(t) => ReturnShape::Fallible(t.clone()),
        ReturnKind::Nothing => {
            return Err(SfqError::Signature(
                "function must return a value".to_string(),
            ));
        }
        ReturnKind::ErrorOnly => {
            return Err(SfqError::Signature(
                "function returns only an error; a value is required".to_string(),
            ));
        }
        ReturnKind::Unsupported(name) => {
            return Err(SfqError::Signature(format!(
                "unsupported return type {name}"
            )));
        }
    };

    Ok(FunctionSignature {
        has_context,
        fixed,
        variadic,
        returns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(params: Vec<ParamKind>, ret: ReturnKind) -> DeclaredShape {
        DeclaredShape { params, ret }
    }

    fn float() -> ParamKind {
        ParamKind::Value(ValueType::Float)
    }

    fn rest() -> ParamKind {
        ParamKind::Variadic(ValueType::Int)
    }

    /// One representative parameter list per legal form.
    fn legal_forms() -> Vec<(SignatureForm, Vec<ParamKind>)> {
        use ParamKind::Context;
        vec![
            (SignatureForm::ContextOnly, vec![Context]),
            (SignatureForm::NoParameters, vec![]),
            (SignatureForm::ContextFixed, vec![Context, float(), float()]),
            (SignatureForm::Fixed, vec![float()]),
            (SignatureForm::ContextVariadic, vec![Context, rest()]),
            (SignatureForm::Variadic, vec![rest()]),
            (SignatureForm::ContextFixedVariadic, vec![Context, float(), rest()]),
            (SignatureForm::FixedVariadic, vec![float(), float(), rest()]),
        ]
    }

    #[test]
    fn accepts_all_eight_forms_with_both_returns() {
        for (form, params) in legal_forms() {
            for ret in [
                ReturnKind::Value(ValueType::Int),
                ReturnKind::ValueOrError(ValueType::Int),
            ] {
                let sig = validate(&shape(params.clone(), ret)).expect("legal form");
                assert_eq!(sig.form(), form);
            }
        }
    }

    #[test]
    fn rejects_each_form_with_misplaced_context() {
        for (form, mut params) in legal_forms() {
            if params.first() == Some(&ParamKind::Context) {
                params.remove(0);
            }
            params.push(ParamKind::Context);
            if params.len() == 1 {
                // a lone context is the legal ContextOnly form
                params.insert(0, float());
            }
            let err = validate(&shape(params, ReturnKind::Value(ValueType::Int)))
                .expect_err("context not first");
            assert!(matches!(err, SfqError::Signature(_)), "{form:?}");
        }
    }

    #[test]
    fn rejects_each_form_with_unsupported_parameter() {
        for (form, mut params) in legal_forms() {
            let at = usize::from(params.first() == Some(&ParamKind::Context));
            params.insert(at, ParamKind::Unsupported("HashSet<i32>".to_string()));
            let err = validate(&shape(params, ReturnKind::Value(ValueType::Int)))
                .expect_err("unsupported type");
            assert!(err.to_string().contains("HashSet<i32>"), "{form:?}");
        }
    }

    #[test]
    fn rejects_each_form_with_two_variadics() {
        for (form, mut params) in legal_forms() {
            if !matches!(params.last(), Some(ParamKind::Variadic(_))) {
                params.push(rest());
            }
            params.push(rest());
            let err = validate(&shape(params, ReturnKind::Value(ValueType::Int)))
                .expect_err("two variadics");
            assert!(matches!(err, SfqError::Signature(_)), "{form:?}");
        }
    }

    #[test]
    fn rejects_each_form_without_return_value() {
        for (form, params) in legal_forms() {
            for ret in [
                ReturnKind::Nothing,
                ReturnKind::ErrorOnly,
                ReturnKind::Unsupported("*mut u8".to_string()),
            ] {
                let err = validate(&shape(params.clone(), ret)).expect_err("bad return");
                assert!(matches!(err, SfqError::Signature(_)), "{form:?}");
            }
        }
    }

    #[test]
    fn rejects_fixed_parameter_after_variadic() {
        let err = validate(&shape(vec![rest(), float()], ReturnKind::Value(ValueType::Int)))
            .expect_err("variadic not last");
        assert!(err.to_string().contains("variadic must be last"));
    }

    #[test]
    fn accept_counts_only_non_context_parameters() {
        let fixed = validate(&shape(
            vec![ParamKind::Context, float(), float()],
            ReturnKind::Value(ValueType::Float),
        ))
        .unwrap();
        assert!(fixed.accepts(2));
        assert!(!fixed.accepts(1));
        assert!(!fixed.accepts(3));

        let var = validate(&shape(vec![float(), rest()], ReturnKind::Value(ValueType::Int))).unwrap();
        for n in 0..16 {
            assert_eq!(var.accepts(n), n >= 1, "arity {n}");
        }
    }

    #[test]
    fn display_lists_slots() {
        let sig = validate(&shape(
            vec![ParamKind::Context, float(), rest()],
            ReturnKind::ValueOrError(ValueType::Float),
        ))
        .unwrap();
        assert_eq!(sig.to_string(), "(ctx, float, ...int) -> float or error");
    }
}
