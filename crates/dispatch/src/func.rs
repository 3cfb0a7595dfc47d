use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use rk_domain::error::Result;
use rk_domain::InboundMeta;

use crate::{DispatchTarget, TargetKind};

type SendFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type SendFn = dyn Fn(String, InboundMeta) -> SendFuture + Send + Sync;

/// Dispatch target backed by an async closure.
pub struct FnTarget {
    name: String,
    f: Box<SendFn>,
}

impl FnTarget {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String, InboundMeta) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(move |text, meta| Box::pin(f(text, meta))),
        }
    }
}

#[async_trait]
impl DispatchTarget for FnTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Custom
    }

    async fn send(&self, text: &str, meta: &InboundMeta) -> Result<()> {
        (self.f)(text.to_owned(), meta.clone()).await
    }
}
