use serde_json::Value;

use crate::transport::{ApiError, ApiRequest};
use crate::types::{Page, Review};
use crate::Client;

const REVIEWS: &str = "/reviews";

impl Client {
    pub async fn seller_reviews(&self, user_id: u64) -> Result<Page<Review>, ApiError> {
        let value = self
            .cached_get(&format!("{REVIEWS}/seller/{user_id}"), Vec::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// A new review changes the seller's list, the rating shown on their
    /// listings, and the reviewed listing's detail when one is referenced.
    pub async fn create_review(&self, payload: Value) -> Result<Review, ApiError> {
        let value = self.run_mutation(ApiRequest::post(REVIEWS, payload)).await?;
        let review: Review = serde_json::from_value(value)?;
        self.cache
            .invalidate_exact(&format!("{REVIEWS}/seller/{}", review.seller.id));
        self.cache.invalidate_exact("/catalog/listings");
        if let Some(listing) = review.listing {
            self.cache.invalidate(&format!("/catalog/listings/{listing}"));
        }
        Ok(review)
    }

    pub async fn delete_review(&self, id: u64) -> Result<(), ApiError> {
        self.run_mutation(ApiRequest::delete(format!("{REVIEWS}/{id}")))
            .await?;
        // the deleted review's seller and listing are not known from the id
        self.cache.invalidate(&format!("{REVIEWS}/seller"));
        self.cache.invalidate_exact("/catalog/listings");
        Ok(())
    }
}
