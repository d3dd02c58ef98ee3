//! Generic adapter: turns a typed Rust function into a [`Udf`].
//!
//! The parameter list is read from the function's type through [`Param`]:
//! - [`SharedContext`] is the context slot
//! - [`Variadic<T>`] collects every remaining argument
//! - any other supported type is a fixed slot coerced with [`FromValue`]
//!
//! The return type goes through [`Returns`]: a bare value, or `Result<T, E>`
//! whose `Err` surfaces as `SfqError::UdfExecution`. The resulting
//! [`DeclaredShape`] is validated once by [`validate`]; calls then pay for
//! coercion on every argument, so hot functions may prefer implementing
//! [`Udf`] by hand.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sfq_common::{BoxError, Result, SfqError};
use sfq_types::{Blob, FromValue, IntoValue, NativeType, Value};
use tracing::debug;

use crate::context::SharedContext;
use crate::signature::{DeclaredShape, FunctionSignature, ParamKind, ReturnKind, validate};
use crate::udf::Udf;

/// Trailing variadic parameter; holds every remaining argument coerced to `T`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variadic<T>(pub Vec<T>);

impl<T> Variadic<T> {
    /// Collected arguments.
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T> Deref for Variadic<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

/// Positional reader over call arguments.
#[derive(Debug)]
pub struct ArgCursor<'a> {
    args: &'a [Value],
    pos: usize,
}

impl<'a> ArgCursor<'a> {
    /// Cursor at the first argument.
    pub fn new(args: &'a [Value]) -> Self {
        Self { args, pos: 0 }
    }

    /// Next argument and its position.
    pub fn next_arg(&mut self) -> Result<(usize, &'a Value)> {
        let pos = self.pos;
        let value = self.args.get(pos).ok_or_else(|| {
            SfqError::Arity(format!("missing argument at position {pos}"))
        })?;
        self.pos += 1;
        Ok((pos, value))
    }

    /// All remaining arguments with their positions.
    pub fn rest(&mut self) -> impl Iterator<Item = (usize, &'a Value)> + 'a {
        let start = self.pos;
        let args: &'a [Value] = self.args;
        self.pos = args.len();
        args[start.min(args.len())..]
            .iter()
            .enumerate()
            .map(move |(i, v)| (start + i, v))
    }
}

fn at_argument(pos: usize, err: SfqError) -> SfqError {
    match err {
        SfqError::TypeCoercion(msg) => SfqError::TypeCoercion(format!("argument {pos}: {msg}")),
        other => other,
    }
}

/// A parameter type the generic adapter knows how to fill.
pub trait Param: Sized {
    /// Slot kind reported to the signature validator.
    fn kind() -> ParamKind;
    /// Produce the parameter from the context and the argument cursor.
    fn extract(ctx: &SharedContext, args: &mut ArgCursor<'_>) -> Result<Self>;
}

impl Param for SharedContext {
    fn kind() -> ParamKind {
        ParamKind::Context
    }

    fn extract(ctx: &SharedContext, _args: &mut ArgCursor<'_>) -> Result<Self> {
        Ok(Arc::clone(ctx))
    }
}

impl<T: FromValue> Param for Variadic<T> {
    fn kind() -> ParamKind {
        ParamKind::Variadic(T::value_type())
    }

    fn extract(_ctx: &SharedContext, args: &mut ArgCursor<'_>) -> Result<Self> {
        args.rest()
            .map(|(pos, v)| T::from_value(v).map_err(|e| at_argument(pos, e)))
            .collect::<Result<Vec<_>>>()
            .map(Variadic)
    }
}

macro_rules! impl_value_param {
    ($([$($g:ident),*] $ty:ty),* $(,)?) => {$(
        impl<$($g: FromValue),*> Param for $ty {
            fn kind() -> ParamKind {
                ParamKind::Value(<$ty as NativeType>::value_type())
            }

            fn extract(_ctx: &SharedContext, args: &mut ArgCursor<'_>) -> Result<Self> {
                let (pos, value) = args.next_arg()?;
                <$ty as FromValue>::from_value(value).map_err(|e| at_argument(pos, e))
            }
        }
    )*};
}

impl_value_param!(
    [] bool,
    [] i8,
    [] i16,
    [] i32,
    [] i64,
    [] u8,
    [] u16,
    [] u32,
    [] u64,
    [] f32,
    [] f64,
    [] String,
    [] Blob,
    [] DateTime<Utc>,
    [] Value,
    [T] Vec<T>,
    [T] Option<T>,
    [T] BTreeMap<String, T>,
    [T] HashMap<String, T>,
);

/// A return type the generic adapter knows how to convert back.
pub trait Returns {
    /// Slot kind reported to the signature validator.
    fn kind() -> ReturnKind;
    /// Convert the native result into a call outcome.
    fn into_outcome(self) -> Result<Value>;
}

impl Returns for () {
    fn kind() -> ReturnKind {
        ReturnKind::Nothing
    }

    fn into_outcome(self) -> Result<Value> {
        Ok(Value::Null)
    }
}

impl<E: Into<BoxError>> Returns for std::result::Result<(), E> {
    fn kind() -> ReturnKind {
        ReturnKind::ErrorOnly
    }

    fn into_outcome(self) -> Result<Value> {
        self.map(|()| Value::Null)
            .map_err(|e| SfqError::UdfExecution(e.into()))
    }
}

macro_rules! impl_returns {
    ($([$($g:ident),*] $ty:ty),* $(,)?) => {$(
        impl<$($g: IntoValue),*> Returns for $ty {
            fn kind() -> ReturnKind {
                ReturnKind::Value(<$ty as NativeType>::value_type())
            }

            fn into_outcome(self) -> Result<Value> {
                <$ty as IntoValue>::into_value(self)
            }
        }

        impl<$($g: IntoValue,)* E: Into<BoxError>> Returns for std::result::Result<$ty, E> {
            fn kind() -> ReturnKind {
                ReturnKind::ValueOrError(<$ty as NativeType>::value_type())
            }

            fn into_outcome(self) -> Result<Value> {
                match self {
                    Ok(v) => <$ty as IntoValue>::into_value(v),
                    Err(e) => Err(SfqError::UdfExecution(e.into())),
                }
            }
        }
    )*};
}

impl_returns!(
    [] bool,
    [] i8,
    [] i16,
    [] i32,
    [] i64,
    [] u8,
    [] u16,
    [] u32,
    [] u64,
    [] f32,
    [] f64,
    [] String,
    [] Blob,
    [] DateTime<Utc>,
    [] Value,
    [T] Vec<T>,
    [T] Option<T>,
    [T] BTreeMap<String, T>,
    [T] HashMap<String, T>,
);

/// Typed function the adapter can wrap. `M` is the parameter tuple, used only
/// to keep implementations for different arities apart.
pub trait GenericFunction<M>: Send + Sync + 'static {
    /// Parameter and return slots derived from the function type.
    fn shape() -> DeclaredShape;
    /// Extract parameters from `args`, call, and convert the result.
    fn invoke(&self, ctx: &SharedContext, args: &[Value]) -> Result<Value>;
}

macro_rules! impl_generic_function {
    ($($a:ident $v:ident),*) => {
        impl<F, R, $($a,)*> GenericFunction<($($a,)*)> for F
        where
            F: Fn($($a),*) -> R + Send + Sync + 'static,
            R: Returns,
            $($a: Param,)*
        {
            fn shape() -> DeclaredShape {
                DeclaredShape {
                    params: vec![$(<$a as Param>::kind()),*],
                    ret: R::kind(),
                }
            }

            #[allow(unused_variables, unused_mut)]
            fn invoke(&self, ctx: &SharedContext, args: &[Value]) -> Result<Value> {
                let mut cursor = ArgCursor::new(args);
                $(let $v = <$a as Param>::extract(ctx, &mut cursor)?;)*
                (self)($($v),*).into_outcome()
            }
        }
    };
}

impl_generic_function!();
impl_generic_function!(A1 a1);
impl_generic_function!(A1 a1, A2 a2);
impl_generic_function!(A1 a1, A2 a2, A3 a3);
impl_generic_function!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_generic_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_generic_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_generic_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_generic_function!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);

/// Declared shape of `function`, before validation.
fn shape_of<M, F: GenericFunction<M>>(_function: &F) -> DeclaredShape {
    F::shape()
}

type Thunk = dyn Fn(&SharedContext, &[Value]) -> Result<Value> + Send + Sync;

/// [`Udf`] produced by [`convert_generic`].
pub struct GenericUdf {
    signature: FunctionSignature,
    thunk: Box<Thunk>,
}

impl GenericUdf {
    /// Validated signature of the wrapped function.
    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }
}

impl fmt::Debug for GenericUdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericUdf")
            .field("signature", &self.signature.to_string())
            .finish()
    }
}

impl Udf for GenericUdf {
    fn call(&self, ctx: &SharedContext, args: &[Value]) -> Result<Value> {
        if !self.signature.accepts(args.len()) {
            return Err(SfqError::Arity(format!(
                "{} does not accept {} argument(s)",
                self.signature,
                args.len()
            )));
        }
        (self.thunk)(ctx, args)
    }

    fn accept(&self, arity: usize) -> bool {
        self.signature.accepts(arity)
    }

    fn is_aggregation_parameter(&self, _position: usize) -> bool {
        false
    }

    fn arity_bounds(&self) -> Option<(usize, Option<usize>)> {
        let fixed = self.signature.fixed.len();
        Some((fixed, self.signature.variadic.is_none().then_some(fixed)))
    }
}

/// Validate `function`'s signature and wrap it as a [`Udf`].
pub fn convert_generic<M, F>(function: F) -> Result<GenericUdf>
where
    F: GenericFunction<M>,
{
    let shape = shape_of(&function);
    let signature = validate(&shape).inspect_err(|e| {
        debug!(?shape, error = %e, "rejected generic udf signature");
    })?;
    Ok(GenericUdf {
        signature,
        thunk: Box::new(move |ctx: &SharedContext, args: &[Value]| function.invoke(ctx, args)),
    })
}

/// Like [`convert_generic`] but panics on an illegal signature; meant for
/// process-start wiring.
pub fn must_convert_generic<M, F>(function: F) -> GenericUdf
where
    F: GenericFunction<M>,
{
    match convert_generic(function) {
        Ok(udf) => udf,
        Err(e) => panic!("cannot convert generic udf: {e}"),
    }
}
