//! Typed service registry.
//!
//! A service is a receiver value plus a table of named methods. Each method
//! is registered with a strongly-typed async handler; the argument and reply
//! types are fixed at registration. Decoding a request body yields the
//! handler's future directly, so nothing is type-erased between decoding the
//! argument and invoking the method.
//!
//! ```ignore
//! let foo = Service::builder(Foo)
//!     .method("Sum", |_foo: Arc<Foo>, args: Args| async move {
//!         Ok::<_, String>(args.num1 + args.num2)
//!     })
//!     .build();
//! server.register(foo)?;
//! ```

use crate::error::ServerError;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use minirpc_protocol::CodecType;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A decoded argument bound to its handler, not yet run.
pub(crate) struct PreparedCall(BoxFuture<'static, Result<Bytes, String>>);

type PrepareFn = Box<dyn Fn(CodecType, &[u8]) -> Result<PreparedCall, ServerError> + Send + Sync>;

/// Returns whether `name` is usable as a service or method name: an
/// identifier starting with an uppercase ASCII letter.
pub fn is_exported(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Derives a service name from a Rust type path, e.g.
/// `my_app::services::Foo<u8>` becomes `Foo`.
fn short_type_name<S>() -> &'static str {
    let full = type_name::<S>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A registered method.
pub struct MethodType {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    num_calls: AtomicU64,
    prepare: PrepareFn,
}

impl MethodType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the argument.
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Rust type name of the reply.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Number of times the method has been invoked.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }

    /// Decodes an argument body into a fresh value of the method's argument
    /// type and binds it to the handler.
    pub(crate) fn prepare(&self, codec: CodecType, body: &[u8]) -> Result<PreparedCall, ServerError> {
        (self.prepare)(codec, body)
    }

    /// Invokes the handler and encodes its reply.
    ///
    /// A handler failure comes back as the text placed in the response header.
    pub(crate) fn call(&self, prepared: PreparedCall) -> BoxFuture<'static, Result<Bytes, String>> {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        prepared.0
    }
}

impl std::fmt::Debug for MethodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodType")
            .field("name", &self.name)
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .field("num_calls", &self.num_calls())
            .finish()
    }
}

/// A named receiver and its callable methods.
#[derive(Debug)]
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodType>>,
}

impl Service {
    /// Starts a service named after the receiver's type.
    pub fn builder<S: Send + Sync + 'static>(receiver: S) -> ServiceBuilder<S> {
        ServiceBuilder::new(short_type_name::<S>(), receiver)
    }

    /// Starts a service with an explicit name.
    pub fn with_name<S: Send + Sync + 'static>(
        name: impl Into<String>,
        receiver: S,
    ) -> ServiceBuilder<S> {
        ServiceBuilder::new(name, receiver)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a method by name.
    pub fn method(&self, name: &str) -> Option<Arc<MethodType>> {
        self.methods.get(name).cloned()
    }

    /// Returns the registered method names in sorted order.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn methods(&self) -> impl Iterator<Item = &MethodType> {
        self.methods.values().map(Arc::as_ref)
    }
}

/// Collects the methods of a service around a shared receiver.
pub struct ServiceBuilder<S> {
    name: String,
    receiver: Arc<S>,
    methods: HashMap<String, Arc<MethodType>>,
}

impl<S: Send + Sync + 'static> ServiceBuilder<S> {
    fn new(name: impl Into<String>, receiver: S) -> Self {
        Self {
            name: name.into(),
            receiver: Arc::new(receiver),
            methods: HashMap::new(),
        }
    }

    /// Adds a method.
    ///
    /// The handler receives the shared receiver and the decoded argument and
    /// resolves to the reply or a failure whose text is sent back to the
    /// caller. Methods whose names are not exported are skipped.
    pub fn method<A, R, E, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        if !is_exported(name) {
            tracing::debug!("rpc server: skipping unexported method {}.{}", self.name, name);
            return self;
        }

        let receiver = self.receiver.clone();
        let handler = Arc::new(handler);
        let prepare: PrepareFn = Box::new(move |codec: CodecType, body: &[u8]| {
            let argument: A = codec.decode(body).map_err(ServerError::ReadArgument)?;
            let handler = handler.clone();
            let receiver = receiver.clone();
            // The handler runs only once the call is polled.
            let reply = async move {
                let reply = handler(receiver, argument).await.map_err(|e| e.to_string())?;
                codec
                    .encode(&reply)
                    .map(Bytes::from)
                    .map_err(|e| ServerError::EncodeReply(e).to_string())
            };
            Ok(PreparedCall(reply.boxed()))
        });

        let method = MethodType {
            name: name.to_string(),
            arg_type: type_name::<A>(),
            reply_type: type_name::<R>(),
            num_calls: AtomicU64::new(0),
            prepare,
        };
        self.methods.insert(name.to_string(), Arc::new(method));
        self
    }

    pub fn build(self) -> Service {
        Service {
            name: self.name,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct Foo;

    #[derive(Debug, Serialize, Deserialize)]
    struct Args {
        num1: i64,
        num2: i64,
    }

    fn foo_service() -> Service {
        Service::builder(Foo)
            .method("Sum", |_foo: Arc<Foo>, args: Args| async move {
                Ok::<_, String>(args.num1 + args.num2)
            })
            .method("Fail", |_foo: Arc<Foo>, _args: Args| async move {
                Err::<i64, _>("always fails")
            })
            .method("hidden", |_foo: Arc<Foo>, args: Args| async move {
                Ok::<_, String>(args.num1)
            })
            .build()
    }

    #[test]
    fn test_is_exported() {
        assert!(is_exported("Foo"));
        assert!(is_exported("Foo_2"));
        assert!(!is_exported("foo"));
        assert!(!is_exported(""));
        assert!(!is_exported("Foo.Bar"));
        assert!(!is_exported("_Foo"));
    }

    #[test]
    fn test_name_from_type() {
        assert_eq!(foo_service().name(), "Foo");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
        assert_eq!(Service::with_name("Calc", Foo).build().name(), "Calc");
    }

    #[test]
    fn test_unexported_methods_are_skipped() {
        let service = foo_service();
        assert_eq!(service.method_names(), vec!["Fail", "Sum"]);
        assert!(service.method("hidden").is_none());
    }

    #[test]
    fn test_method_shapes_recorded() {
        let service = foo_service();
        let sum = service.method("Sum").unwrap();
        assert!(sum.arg_type().ends_with("Args"));
        assert_eq!(sum.reply_type(), "i64");
        assert_eq!(sum.num_calls(), 0);
    }

    #[tokio::test]
    async fn test_call_decodes_invokes_and_counts() {
        let service = foo_service();
        let sum = service.method("Sum").unwrap();
        let codec = CodecType::Json;

        let prepared = sum.prepare(codec, br#"{"num1":3,"num2":4}"#).unwrap();
        assert_eq!(sum.num_calls(), 0);
        let reply = sum.call(prepared).await.unwrap();
        assert_eq!(&reply[..], b"7");
        assert_eq!(sum.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_text() {
        let service = foo_service();
        let fail = service.method("Fail").unwrap();
        let codec = CodecType::Postcard;

        let body = codec.encode(&Args { num1: 1, num2: 2 }).unwrap();
        let prepared = fail.prepare(codec, &body).unwrap();
        let err = fail.call(prepared).await.unwrap_err();
        assert_eq!(err, "always fails");
        assert_eq!(fail.num_calls(), 1);
    }

    #[test]
    fn test_bad_argument_is_read_error() {
        let service = foo_service();
        let sum = service.method("Sum").unwrap();
        let err = match sum.prepare(CodecType::Json, br#"{"num1":"three"}"#) {
            Ok(_) => panic!("argument should not decode"),
            Err(e) => e,
        };
        assert!(matches!(err, ServerError::ReadArgument(_)));
        assert_eq!(sum.num_calls(), 0);
    }
}
