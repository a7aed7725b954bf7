//! Host functions callable from Aspects
//!
//! A host function is lowered to a uniform shape: it takes a list of decoded
//! values and hands back at most one value, or the text of an error.  Native
//! Rust closures are lowered through `IntoHostFunction`, a closed family of
//! adapters covering zero to three `Marshal` parameters and one of three
//! result shapes:
//!
//! - `R`: a value, for calls that cannot fail;
//! - `Result<R, E>`: a value or an error;
//! - `Result<(), E>`: side effects only, or an error.
//!
//! Anything else does not implement the trait and is rejected at compile
//! time.  Functions described at runtime go through `HostFunction::dynamic`
//! and have their signature checked when they are registered.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use crate::{
    codec::{Marshal, TypeKind, Value},
    error::{DecodeError, RuntimeError},
    gas::{GasQuota, GasRule, HostContext},
};
use std::{fmt, marker::PhantomData, sync::Arc, vec::IntoIter};

/// Most parameters a host function may take.
pub const MAX_HOST_FUNCTION_PARAMS: usize = 3;

////////////////////////////////////////////////////////////////////////////////
// Signatures.
////////////////////////////////////////////////////////////////////////////////

/// The wire-level shape of a host function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<TypeKind>,
    /// Non-error results.
    pub results: Vec<TypeKind>,
    /// Whether a trailing error slot follows the results.
    pub fallible: bool,
}

impl Signature {
    pub fn new(params: Vec<TypeKind>, results: Vec<TypeKind>, fallible: bool) -> Self {
        Self {
            params,
            results,
            fallible,
        }
    }

    /// Checks that the signature fits the guest calling convention: up to three
    /// pointer parameters, and one or two outputs where a second output can
    /// only be the error slot.
    pub fn check(&self) -> Result<(), String> {
        if self.params.len() > MAX_HOST_FUNCTION_PARAMS {
            return Err(format!("{} parameters", self.params.len()));
        }
        if self.results.len() > 1 {
            return Err(format!("{} non-error results", self.results.len()));
        }
        if self.results.is_empty() && !self.fallible {
            return Err("no outputs".to_string());
        }
        if self
            .params
            .iter()
            .chain(self.results.iter())
            .any(|kind| *kind == TypeKind::Empty)
        {
            return Err("unsupported parameter or result type".to_string());
        }
        Ok(())
    }

    /// Whether the guest import returns a pointer rather than nothing.
    #[inline]
    pub fn returns_value(&self) -> bool {
        !self.results.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |kinds: &[TypeKind]| {
            kinds
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "({}) -> ({}", join(&self.params), join(&self.results))?;
        if self.fallible {
            if !self.results.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("error")?;
        }
        f.write_str(")")
    }
}

////////////////////////////////////////////////////////////////////////////////
// Host functions.
////////////////////////////////////////////////////////////////////////////////

type HostCall = dyn Fn(Vec<Value>) -> Result<Option<Value>, RuntimeError> + Send + Sync;

/// A host function lowered to values in, at most one value out.
#[derive(Clone)]
pub struct HostFunction {
    signature: Signature,
    call: Arc<HostCall>,
}

impl HostFunction {
    fn from_parts<F>(signature: Signature, call: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Option<Value>, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            signature,
            call: Arc::new(call),
        }
    }

    /// Wraps a function whose shape is only known at runtime.  `f` returns
    /// its non-error results, or an error message.  The signature is checked
    /// at registration; the number of results `f` returns is checked per
    /// call.
    pub fn dynamic<F>(signature: Signature, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Vec<Value>, String> + Send + Sync + 'static,
    {
        let expected = signature.results.clone();
        Self::from_parts(signature, move |args| {
            let mut results = f(args).map_err(RuntimeError::HostFunction)?;
            let kinds: Vec<TypeKind> = results.iter().map(Value::kind).collect();
            if kinds != expected {
                return Err(RuntimeError::HostFunction(format!(
                    "host function returned {:?}, declared {:?}",
                    kinds, expected
                )));
            }
            Ok(results.pop())
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Invokes the function.  Argument kinds are checked against the
    /// signature first.
    pub fn call(&self, args: Vec<Value>) -> Result<Option<Value>, RuntimeError> {
        if args.len() != self.signature.params.len() {
            return Err(RuntimeError::HostFunction(format!(
                "expected {} arguments, got {}",
                self.signature.params.len(),
                args.len()
            )));
        }
        for (arg, kind) in args.iter().zip(self.signature.params.iter()) {
            if arg.kind() != *kind {
                return Err(DecodeError::KindMismatch {
                    expected: kind.to_string(),
                    found: arg.kind().to_string(),
                }
                .into());
            }
        }
        (self.call)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("signature", &self.signature)
            .finish()
    }
}

/// A registered host function together with its gas rule and the host
/// context it reports its own gas usage through.
#[derive(Clone)]
pub struct HostApi {
    pub(crate) function: HostFunction,
    pub(crate) gas_rule: GasRule,
    pub(crate) host_context: Arc<dyn HostContext>,
}

impl HostApi {
    /// A host API with a private `GasQuota` as its host context.
    pub fn new(function: HostFunction, gas_rule: GasRule) -> Self {
        Self {
            function,
            gas_rule,
            host_context: Arc::new(GasQuota::new()),
        }
    }

    /// Shares `context` with the host function, which typically captured a
    /// clone of it to charge its own work.
    pub fn with_host_context(mut self, context: Arc<dyn HostContext>) -> Self {
        self.host_context = context;
        self
    }

    pub fn function(&self) -> &HostFunction {
        &self.function
    }

    pub fn gas_rule(&self) -> GasRule {
        self.gas_rule
    }

    pub fn host_context(&self) -> &Arc<dyn HostContext> {
        &self.host_context
    }
}

impl fmt::Debug for HostApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostApi")
            .field("function", &self.function)
            .field("gas_rule", &self.gas_rule)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Lowering native closures.
////////////////////////////////////////////////////////////////////////////////

/// Marker for closures returning a bare value.
pub struct Returns<R>(PhantomData<R>);
/// Marker for closures returning `Result<R, E>`.
pub struct Fallible<R, E>(PhantomData<(R, E)>);
/// Marker for closures returning `Result<(), E>`.
pub struct FallibleUnit<E>(PhantomData<E>);

/// Native closures that can be lowered to a `HostFunction`.  `Args` and
/// `Marker` are inferred from the closure's signature.
pub trait IntoHostFunction<Args, Marker> {
    fn into_host_function(self) -> HostFunction;
}

fn next_arg<A: Marshal>(args: &mut IntoIter<Value>) -> Result<A, RuntimeError> {
    let value = args.next().ok_or_else(|| {
        RuntimeError::HostFunction("missing host function argument".to_string())
    })?;
    Ok(A::from_value(value)?)
}

macro_rules! impl_into_host_function {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> IntoHostFunction<($($arg,)*), Returns<R>> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: Marshal,
            $($arg: Marshal,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_function(self) -> HostFunction {
                HostFunction::from_parts(
                    Signature::new(vec![$($arg::KIND),*], vec![R::KIND], false),
                    move |args| {
                        let mut args = args.into_iter();
                        $(let $arg = next_arg::<$arg>(&mut args)?;)*
                        Ok(Some((self)($($arg),*).into_value()))
                    },
                )
            }
        }

        impl<F, R, E, $($arg,)*> IntoHostFunction<($($arg,)*), Fallible<R, E>> for F
        where
            F: Fn($($arg),*) -> Result<R, E> + Send + Sync + 'static,
            R: Marshal,
            E: fmt::Display,
            $($arg: Marshal,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_function(self) -> HostFunction {
                HostFunction::from_parts(
                    Signature::new(vec![$($arg::KIND),*], vec![R::KIND], true),
                    move |args| {
                        let mut args = args.into_iter();
                        $(let $arg = next_arg::<$arg>(&mut args)?;)*
                        match (self)($($arg),*) {
                            Ok(result) => Ok(Some(result.into_value())),
                            Err(e) => Err(RuntimeError::HostFunction(e.to_string())),
                        }
                    },
                )
            }
        }

        impl<F, E, $($arg,)*> IntoHostFunction<($($arg,)*), FallibleUnit<E>> for F
        where
            F: Fn($($arg),*) -> Result<(), E> + Send + Sync + 'static,
            E: fmt::Display,
            $($arg: Marshal,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_function(self) -> HostFunction {
                HostFunction::from_parts(
                    Signature::new(vec![$($arg::KIND),*], Vec::new(), true),
                    move |args| {
                        let mut args = args.into_iter();
                        $(let $arg = next_arg::<$arg>(&mut args)?;)*
                        (self)($($arg),*)
                            .map(|()| None)
                            .map_err(|e| RuntimeError::HostFunction(e.to_string()))
                    },
                )
            }
        }
    };
}

impl_into_host_function!();
impl_into_host_function!(A1);
impl_into_host_function!(A1, A2);
impl_into_host_function!(A1, A2, A3);
