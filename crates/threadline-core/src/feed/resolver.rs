//! Deep-link resolution
//!
//! Turns a comment or reply reference into the top-level comment to pin and
//! the id to highlight. At most two fetches: the referenced entity, then its
//! parent once the first fetch has produced a `parent_id`.

use tracing::{debug, warn};

use super::error::FeedError;
use super::model::{AnchorResolution, Comment, CommentId, ExternalRef};
use crate::source::CommentSource;

/// Resolves external references against a [`CommentSource`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepLinkResolver {
    /// Reject comment references that turn out to name a reply
    strict_comment_refs: bool,
}

impl DeepLinkResolver {
    pub fn new(strict_comment_refs: bool) -> Self {
        Self {
            strict_comment_refs,
        }
    }

    /// Resolve `reference` into an anchor and highlight
    ///
    /// The highlight is always the id the reference named. The anchor is
    /// that entity when it is top-level, otherwise its parent.
    pub async fn resolve<S: CommentSource + ?Sized>(
        &self,
        source: &S,
        reference: &ExternalRef,
    ) -> Result<AnchorResolution, FeedError> {
        let highlight_id = reference.id().clone();
        let entity = source.fetch_comment_by_id(&highlight_id).await?;

        let anchor = match (reference, entity.parent_id.clone()) {
            (_, None) => entity,
            (ExternalRef::Comment(id), Some(parent)) => {
                if self.strict_comment_refs {
                    return Err(FeedError::InvalidReference(format!(
                        "comment link {id} names a reply of {parent}"
                    )));
                }
                warn!(%id, %parent, "Comment link names a reply, anchoring on its parent");
                fetch_parent(source, &highlight_id, &parent).await?
            }
            (ExternalRef::Reply(_), Some(parent)) => {
                fetch_parent(source, &highlight_id, &parent).await?
            }
        };

        debug!(
            reference = %reference,
            anchor = %anchor.id,
            "Resolved deep link"
        );
        Ok(AnchorResolution {
            anchor,
            highlight_id,
        })
    }
}

async fn fetch_parent<S: CommentSource + ?Sized>(
    source: &S,
    reply: &CommentId,
    parent: &CommentId,
) -> Result<Comment, FeedError> {
    let parent = source.fetch_comment_by_id(parent).await?;
    if let Some(grandparent) = &parent.parent_id {
        return Err(FeedError::InvalidReference(format!(
            "reply {reply} hangs off reply {} of {grandparent}",
            parent.id
        )));
    }
    Ok(parent)
}
