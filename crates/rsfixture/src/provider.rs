//! Type-erased providers and callables.
//!
//! Fixtures, hooks and test bodies are ordinary closures or `fn` items whose
//! parameters are resolved by type. [`Injectable`] is implemented for every
//! `Fn` of up to eight parameters; it reports the parameter [`TypeKey`]s and
//! calls the function with already-resolved [`Value`]s.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};
use crate::handle::{panic_message, SkipSignal};

/// A resolved value, shared between the parameters that request it.
pub type Value = Arc<dyn Any + Send + Sync>;

// ============================================================================
// TypeKey
// ============================================================================

/// Identifies a parameter or result type.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeKey {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Parameters and outcomes
// ============================================================================

/// Types that can be injected as a parameter. Each parameter receives its
/// own clone of the resolved value, so share mutable state through `Arc`.
pub trait Param: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Param for T {}

fn take<T: Param>(value: Option<&Value>) -> Result<T> {
    value
        .and_then(|v| v.downcast_ref::<T>())
        .cloned()
        .ok_or_else(|| Error::TypeMismatch {
            type_name: type_name::<T>().to_string(),
        })
}

/// Return types accepted from hooks and test bodies.
pub trait Outcome {
    fn into_outcome(self) -> std::result::Result<(), String>;
}

impl Outcome for () {
    fn into_outcome(self) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> Outcome for std::result::Result<(), E> {
    fn into_outcome(self) -> std::result::Result<(), String> {
        self.map_err(|e| e.to_string())
    }
}

// ============================================================================
// Injectable
// ============================================================================

/// A function whose parameters are resolved by type.
pub trait Injectable<Args, Out>: Send + Sync + 'static {
    /// Parameter types, in declaration order.
    fn parameters() -> Vec<TypeKey>;

    /// Call with values resolved for [`parameters`](Self::parameters).
    fn call(&self, args: &[Value]) -> Result<Out>;
}

macro_rules! impl_injectable {
    ($($param:ident),*) => {
        impl<Func, Out, $($param,)*> Injectable<($($param,)*), Out> for Func
        where
            Func: Fn($($param),*) -> Out + Send + Sync + 'static,
            $($param: Param,)*
        {
            fn parameters() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$param>()),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, args: &[Value]) -> Result<Out> {
                let mut args = args.iter();
                $(let $param = take::<$param>(args.next())?;)*
                Ok((self)($($param),*))
            }
        }
    };
}

impl_injectable!();
impl_injectable!(A1);
impl_injectable!(A1, A2);
impl_injectable!(A1, A2, A3);
impl_injectable!(A1, A2, A3, A4);
impl_injectable!(A1, A2, A3, A4, A5);
impl_injectable!(A1, A2, A3, A4, A5, A6);
impl_injectable!(A1, A2, A3, A4, A5, A6, A7);
impl_injectable!(A1, A2, A3, A4, A5, A6, A7, A8);

// ============================================================================
// Providers
// ============================================================================

/// Something that produces a value of one type from values of others.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn result_type(&self) -> TypeKey;

    fn dependencies(&self) -> &[TypeKey];

    /// Produce the value. `args` line up with [`dependencies`](Self::dependencies).
    fn invoke(&self, args: &[Value]) -> Result<Value>;

    /// A value already produced for the whole run, if any.
    fn memoized(&self) -> Option<Value> {
        None
    }
}

/// A fixture backed by a plain function.
pub struct FnProvider<F, Args, Out> {
    name: String,
    dependencies: Vec<TypeKey>,
    func: F,
    _marker: PhantomData<fn(Args) -> Out>,
}

impl<F, Args, Out> FnProvider<F, Args, Out>
where
    F: Injectable<Args, Out>,
    Out: Param,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        FnProvider {
            name: name.into(),
            dependencies: F::parameters(),
            func,
            _marker: PhantomData,
        }
    }
}

impl<F, Args, Out> Provider for FnProvider<F, Args, Out>
where
    F: Injectable<Args, Out>,
    Args: 'static,
    Out: Param,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn result_type(&self) -> TypeKey {
        TypeKey::of::<Out>()
    }

    fn dependencies(&self) -> &[TypeKey] {
        &self.dependencies
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        match catch_unwind(AssertUnwindSafe(|| self.func.call(args))) {
            Ok(result) => result.map(|out| Arc::new(out) as Value),
            Err(payload) if payload.is::<SkipSignal>() => resume_unwind(payload),
            Err(payload) => Err(Error::FixtureFailure {
                fixture: self.name.clone(),
                message: panic_message(&*payload),
            }),
        }
    }
}

/// Wraps a provider so its body runs at most once for the lifetime of the
/// provider, no matter how many scopes or threads ask for it.
///
/// Concurrent first callers block until the winner has produced the value.
/// A failure is memoized too: every later caller gets the same error and the
/// body is not attempted again. A skip raised by the body leaves the memo
/// empty.
pub struct OnceProvider {
    inner: Box<dyn Provider>,
    memo: OnceCell<Result<Value>>,
}

impl OnceProvider {
    pub fn new(inner: impl Provider + 'static) -> Self {
        OnceProvider {
            inner: Box::new(inner),
            memo: OnceCell::new(),
        }
    }
}

impl Provider for OnceProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn result_type(&self) -> TypeKey {
        self.inner.result_type()
    }

    fn dependencies(&self) -> &[TypeKey] {
        self.inner.dependencies()
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        self.memo.get_or_init(|| self.inner.invoke(args)).clone()
    }

    fn memoized(&self) -> Option<Value> {
        self.memo.get()?.as_ref().ok().cloned()
    }
}

// ============================================================================
// Callable: hooks and test bodies
// ============================================================================

type ErasedCall = Box<dyn Fn(&[Value]) -> Result<std::result::Result<(), String>> + Send + Sync>;

/// A type-erased hook or test body.
pub struct Callable {
    name: String,
    parameters: Vec<TypeKey>,
    call: ErasedCall,
}

impl Callable {
    pub fn new<F, Args, Out>(name: impl Into<String>, func: F) -> Self
    where
        F: Injectable<Args, Out>,
        Args: 'static,
        Out: Outcome + 'static,
    {
        Callable {
            name: name.into(),
            parameters: F::parameters(),
            call: Box::new(move |args| func.call(args).map(Outcome::into_outcome)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[TypeKey] {
        &self.parameters
    }

    /// Call with resolved arguments. The outer error is a resolution problem,
    /// the inner one is the failure the function itself reported.
    pub fn call(&self, args: &[Value]) -> Result<std::result::Result<(), String>> {
        (self.call)(args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// A readable default name for a function type: the path of a `fn` item, or
/// the enclosing path for closures.
pub(crate) fn function_name<F: ?Sized>() -> String {
    type_name::<F>()
        .trim_end_matches("::{{closure}}")
        .to_string()
}
