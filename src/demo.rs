//! Demo `Foo` service.

use minirpc_server::Service;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Receiver of the demo service.
#[derive(Debug, Default)]
pub struct Foo;

/// Argument of every `Foo` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Args {
    pub num1: i64,
    pub num2: i64,
}

impl Foo {
    pub async fn sum(&self, args: Args) -> Result<i64, String> {
        args.num1
            .checked_add(args.num2)
            .ok_or_else(|| format!("{} + {} overflows", args.num1, args.num2))
    }

    /// Like `sum`, after sleeping `num1` milliseconds.
    pub async fn sleep(&self, args: Args) -> Result<i64, String> {
        let millis = u64::try_from(args.num1)
            .map_err(|_| format!("cannot sleep {} milliseconds", args.num1))?;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        self.sum(args).await
    }
}

/// Builds the `Foo` service with its `Sum` and `Sleep` methods.
pub fn foo_service() -> Service {
    Service::builder(Foo)
        .method("Sum", |foo: Arc<Foo>, args: Args| async move {
            foo.sum(args).await
        })
        .method("Sleep", |foo: Arc<Foo>, args: Args| async move {
            foo.sleep(args).await
        })
        .build()
}
