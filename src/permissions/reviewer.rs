//! Self-subject-access-review seam

use crate::models::ResourceAttributes;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    SelfSubjectAccessReview, SelfSubjectAccessReviewSpec, SubjectAccessReviewStatus,
};
use kube::api::PostParams;
use kube::{Api, Client};

/// Asks an API server whether the caller may perform an action
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    /// Returns the review status, or `None` if the server sent none
    async fn review(&self, attrs: &ResourceAttributes) -> Result<Option<SubjectAccessReviewStatus>>;
}

/// Reviewer posting `SelfSubjectAccessReview` objects through a kube client
#[derive(Clone)]
pub struct KubeAccessReviewer {
    client: Client,
}

impl KubeAccessReviewer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccessReviewer for KubeAccessReviewer {
    async fn review(&self, attrs: &ResourceAttributes) -> Result<Option<SubjectAccessReviewStatus>> {
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(attrs.into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let created = api
            .create(&PostParams::default(), &review)
            .await
            .with_context(|| {
                format!(
                    "Failed to review '{}' on {}/{}",
                    attrs.verb, attrs.group, attrs.resource
                )
            })?;
        Ok(created.status)
    }
}
