//! # Handlers
//!
//! A handler is a named operation on a handler-owning type (a
//! [`Controller`]) together with its declared parameter signature. Handlers
//! are registered as closures, so dispatch needs no runtime introspection:
//!
//! ```ignore
//! let save = Handler::new("save", |_: &mut Students, args| {
//!     let student: Student = args.get("student").unwrap_or_default();
//!     Ok(ModelView::new("saved.html").with("name", student.name).into())
//! })
//! .param::<Student>("student");
//! ```
//!
//! Handlers that need headers or attributes take the request as well, via
//! [`Handler::with_request`].

use crate::binder::{BoundArguments, ParamSpec, ParameterBinder};
use crate::error::{Error, Result};
use crate::request::Request;
use crate::types::Bindable;
use crate::view::ModelView;
use serde_json::{Map, Value};
use std::fmt;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// A handler-owning type
///
/// A fresh instance is constructed for every invocation.
pub trait Controller: Sized + 'static {
    /// Build a fresh instance, or `None` if the type has no usable constructor
    fn construct() -> Option<Self>;

    /// Whether the type is registered as handler-owning
    ///
    /// Unmarked owners still dispatch, but plain results render a
    /// "not a registered handler" diagnostic.
    fn is_marked() -> bool {
        true
    }

    /// Simple type name used in logs, diagnostics and convention paths
    fn type_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Handler return value
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Forward to a named view
    View(ModelView),
    /// Structured data
    Data(Map<String, Value>),
    /// Plain value in textual form
    Text(String),
    /// No value
    Empty,
}

impl From<ModelView> for Outcome {
    fn from(mv: ModelView) -> Self {
        Self::View(mv)
    }
}

impl From<Map<String, Value>> for Outcome {
    fn from(data: Map<String, Value>) -> Self {
        Self::Data(data)
    }
}

impl From<String> for Outcome {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Outcome {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<()> for Outcome {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl<T: Into<Self>> From<Option<T>> for Outcome {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

macro_rules! outcome_from_display {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Outcome {
                fn from(value: $ty) -> Self {
                    Self::Text(value.to_string())
                }
            }
        )+
    };
}

outcome_from_display!(i32, i64, u32, u64, usize, f32, f64, bool);

type Invoker = dyn Fn(&BoundArguments, &Request) -> Result<anyhow::Result<Outcome>> + Send + Sync;

/// A registered handler
pub struct Handler {
    owner: &'static str,
    owner_marked: bool,
    name: String,
    params: Vec<ParamSpec>,
    json: bool,
    invoker: Box<Invoker>,
}

impl Handler {
    /// Create a handler named `name` on owner `C`
    pub fn new<C, F>(name: impl Into<String>, f: F) -> Self
    where
        C: Controller,
        F: Fn(&mut C, &BoundArguments) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        Self::with_request(name, move |owner: &mut C, args: &BoundArguments, _: &Request| f(owner, args))
    }

    /// Create a handler that also receives the request
    pub fn with_request<C, F>(name: impl Into<String>, f: F) -> Self
    where
        C: Controller,
        F: Fn(&mut C, &BoundArguments, &Request) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        let owner = C::type_name();
        Self {
            owner,
            owner_marked: C::is_marked(),
            name: name.into(),
            params: Vec::new(),
            json: false,
            invoker: Box::new(
                move |args: &BoundArguments, request: &Request| -> Result<anyhow::Result<Outcome>> {
                    let mut instance = C::construct().ok_or_else(|| Error::HandlerConstruction {
                        owner: owner.to_string(),
                    })?;
                    Ok(f(&mut instance, args, request))
                },
            ),
        }
    }

    /// Declare the next parameter as Rust type `T`
    #[must_use]
    pub fn param<T: Bindable>(mut self, name: &str) -> Self {
        self.params.push(ParamSpec::of::<T>(name));
        self
    }

    /// Replace the declared signature
    #[must_use]
    pub fn with_params(mut self, params: Vec<ParamSpec>) -> Self {
        self.params = params;
        self
    }

    /// Always render this handler's result as a JSON document
    #[must_use]
    pub const fn json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Owning type name
    #[must_use]
    pub const fn owner(&self) -> &'static str {
        self.owner
    }

    /// Whether the owning type is registered as handler-owning
    #[must_use]
    pub const fn owner_marked(&self) -> bool {
        self.owner_marked
    }

    /// Handler name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter signature
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Whether results always render as JSON
    #[must_use]
    pub const fn is_json(&self) -> bool {
        self.json
    }

    /// Construct a fresh owner and invoke the handler
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerConstruction` if the owner cannot be built and
    /// `Error::Invocation` if the handler fails or panics.
    pub fn invoke(&self, args: &BoundArguments, request: &Request) -> Result<Outcome> {
        self.guarded(|| (self.invoker)(args, request))
    }

    /// Bind this handler's signature with `binder`, then invoke it
    ///
    /// Binding runs under the same panic guard as the handler.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke).
    pub fn call(&self, binder: &ParameterBinder<'_>, request: &Request) -> Result<Outcome> {
        self.guarded(|| {
            let args = binder.bind(&self.params);
            (self.invoker)(&args, request)
        })
    }

    fn guarded(&self, f: impl FnOnce() -> Result<anyhow::Result<Outcome>>) -> Result<Outcome> {
        let outcome = catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| self.failure(panic_message(payload.as_ref())))??;
        outcome.map_err(|e| self.failure(format!("{e:#}")))
    }

    fn failure(&self, message: String) -> Error {
        error!(handler = %self, error = %message, "Handler invocation failed");
        Error::Invocation {
            handler: self.to_string(),
            message,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.name)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("json", &self.json)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Method;
    use crate::types::BoundValue;
    use anyhow::bail;

    fn request() -> Request {
        Request::new(Method::Get, "/greet?name=Ana").with_header("accept-language", "pt")
    }

    struct Greeter {
        greeting: &'static str,
    }

    impl Controller for Greeter {
        fn construct() -> Option<Self> {
            Some(Self { greeting: "Hello" })
        }
    }

    struct Broken;

    impl Controller for Broken {
        fn construct() -> Option<Self> {
            None
        }

        fn is_marked() -> bool {
            false
        }
    }

    #[test]
    fn test_type_name_is_simple() {
        assert_eq!(Greeter::type_name(), "Greeter");
    }

    #[test]
    fn test_invoke_with_arguments() {
        let handler = Handler::new("greet", |g: &mut Greeter, args: &BoundArguments| {
            Ok(format!("{} {}", g.greeting, args.str("name").unwrap_or("nobody")).into())
        })
        .param::<String>("name");

        let mut args = BoundArguments::new();
        args.push("name", BoundValue::Str("Ana".into()));
        assert_eq!(handler.invoke(&args, &request()).unwrap(), Outcome::Text("Hello Ana".into()));
        assert_eq!(handler.to_string(), "Greeter#greet");
        assert_eq!(handler.params().len(), 1);
    }

    #[test]
    fn test_handler_error_becomes_invocation_failure() {
        let handler = Handler::new("fail", |_: &mut Greeter, _: &BoundArguments| bail!("disk full"));
        let err = handler.invoke(&BoundArguments::new(), &request()).unwrap_err();
        assert!(matches!(err, Error::Invocation { .. }));
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_panic_is_caught() {
        let handler = Handler::new("boom", |_: &mut Greeter, _: &BoundArguments| -> anyhow::Result<Outcome> {
            panic!("exploded")
        });
        let err = handler.invoke(&BoundArguments::new(), &request()).unwrap_err();
        assert_eq!(err.to_string(), "exploded");
    }

    #[test]
    fn test_construction_failure() {
        let handler = Handler::new("index", |_: &mut Broken, _: &BoundArguments| Ok(Outcome::Empty));
        assert!(!handler.owner_marked());
        assert!(matches!(
            handler.invoke(&BoundArguments::new(), &request()),
            Err(Error::HandlerConstruction { .. })
        ));
    }

    #[test]
    fn test_handler_receives_request() {
        let handler = Handler::with_request(
            "greet",
            |_: &mut Greeter, _: &BoundArguments, req: &Request| {
                Ok(req.header("accept-language").unwrap_or("en").into())
            },
        );
        let outcome = handler.invoke(&BoundArguments::new(), &request()).unwrap();
        assert_eq!(outcome, Outcome::Text("pt".into()));
    }

    #[test]
    fn test_call_binds_then_invokes() {
        let handler = Handler::new("greet", |g: &mut Greeter, args: &BoundArguments| {
            Ok(format!("{} {}", g.greeting, args.str("name").unwrap_or("nobody")).into())
        })
        .param::<String>("name");
        let req = request();
        let outcome = handler.call(&ParameterBinder::for_request(&req), &req).unwrap();
        assert_eq!(outcome, Outcome::Text("Hello Ana".into()));
    }

    #[test]
    fn test_outcome_conversions() {
        assert_eq!(Outcome::from(42), Outcome::Text("42".into()));
        assert_eq!(Outcome::from(None::<String>), Outcome::Empty);
        assert_eq!(Outcome::from(()), Outcome::Empty);
        assert!(matches!(Outcome::from(ModelView::new("v")), Outcome::View(_)));
    }
}
