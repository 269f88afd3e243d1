use async_trait::async_trait;
use mediagen_domain::MediaStorage;

#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStorage;

#[async_trait]
impl MediaStorage for PassthroughStorage {
    async fn persist(&self, source: &str, _folder: &str) -> String {
        source.to_string()
    }
}
