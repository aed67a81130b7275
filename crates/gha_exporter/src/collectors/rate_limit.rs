use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::Collector;
use crate::context::ExporterContext;

/// Mirrors the remaining core API quota into a gauge.
pub struct RateLimitCollector {
    ctx: Arc<ExporterContext>,
}

impl RateLimitCollector {
    pub fn new(ctx: Arc<ExporterContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Collector for RateLimitCollector {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn interval(&self) -> Duration {
        self.ctx.settings().refresh
    }

    async fn collect(&self) {
        let api = self.ctx.api();
        let Some(limits) = self
            .ctx
            .fetcher()
            .fetch_one("rate_limit", "core", move || api.rate_limit())
            .await
        else {
            return;
        };

        let core = &limits.resources.core;
        tracing::debug!(
            remaining = core.remaining,
            limit = core.limit,
            reset_at = %core.reset_at(),
            "Rate limit polled"
        );
        self.ctx.metrics().rate_limit_remaining.set(core.remaining as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::fake::FakeApi;
    use crate::collectors::test_support::context;
    use crate::context::ExporterSettings;

    #[tokio::test]
    async fn sets_remaining_gauge() {
        let api = Arc::new(FakeApi::default());
        *api.remaining.lock().unwrap() = 4321;
        let (_, ctx) = context(api.clone(), ExporterSettings::default());

        RateLimitCollector::new(ctx.clone()).collect().await;

        assert_eq!(ctx.metrics().rate_limit_remaining.get(), 4321.0);
        assert_eq!(api.call_count("rate_limit"), 1);
    }
}
