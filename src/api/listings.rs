use serde_json::Value;

use crate::filters::FilterState;
use crate::transport::{ApiError, ApiRequest, Body};
use crate::types::{Favorite, ListingDetail, ListingImage, ListingSummary, Page};
use crate::Client;

const LISTINGS: &str = "/catalog/listings";
const FAVORITES: &str = "/catalog/favorites";

impl Client {
    /// Catalog search. The cache key is derived from the full canonical
    /// filter state, so any filter change refetches while a previously seen
    /// combination serves from cache.
    pub async fn search_listings(
        &self,
        filters: &FilterState,
    ) -> Result<Page<ListingSummary>, ApiError> {
        let value = self.cached_get(LISTINGS, filters.params()).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_listing(&self, id: u64) -> Result<ListingDetail, ApiError> {
        let value = self.cached_get(&format!("{LISTINGS}/{id}"), Vec::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Create and update respond with the full detail payload.
    pub async fn create_listing(&self, payload: Value) -> Result<ListingDetail, ApiError> {
        let value = self.run_mutation(ApiRequest::post(LISTINGS, payload)).await?;
        let listing: ListingDetail = serde_json::from_value(value)?;
        self.invalidate_listing(listing.id, Some(listing.seller.id));
        Ok(listing)
    }

    pub async fn update_listing(&self, id: u64, payload: Value) -> Result<ListingDetail, ApiError> {
        let value = self
            .run_mutation(ApiRequest::patch(format!("{LISTINGS}/{id}"), payload))
            .await?;
        let listing: ListingDetail = serde_json::from_value(value)?;
        self.invalidate_listing(id, Some(listing.seller.id));
        Ok(listing)
    }

    pub async fn delete_listing(&self, id: u64) -> Result<(), ApiError> {
        self.run_mutation(ApiRequest::delete(format!("{LISTINGS}/{id}")))
            .await?;
        self.invalidate_listing(id, None);
        Ok(())
    }

    pub async fn upload_image(
        &self,
        listing_id: u64,
        bytes: Vec<u8>,
        filename: impl Into<String>,
        order: Option<u32>,
    ) -> Result<ListingImage, ApiError> {
        let req = ApiRequest {
            method: reqwest::Method::POST,
            path: format!("{LISTINGS}/{listing_id}/images"),
            query: Vec::new(),
            body: Body::Image {
                bytes,
                filename: filename.into(),
                order,
            },
        };
        let value = self.run_mutation(req).await?;
        self.cache.invalidate(&format!("{LISTINGS}/{listing_id}"));
        Ok(serde_json::from_value(value)?)
    }

    /// Upload a batch one image at a time: there is no server-side atomicity
    /// across uploads, so each step waits for the previous one.
    pub async fn upload_images(
        &self,
        listing_id: u64,
        images: Vec<(Vec<u8>, String)>,
    ) -> Result<Vec<ListingImage>, ApiError> {
        let mut uploaded = Vec::with_capacity(images.len());
        for (order, (bytes, filename)) in images.into_iter().enumerate() {
            uploaded.push(
                self.upload_image(listing_id, bytes, filename, Some(order as u32))
                    .await?,
            );
        }
        Ok(uploaded)
    }

    pub async fn delete_image(&self, image_id: u64) -> Result<(), ApiError> {
        self.run_mutation(ApiRequest::delete(format!("/catalog/images/{image_id}")))
            .await?;
        // the owning listing is not known from the image id alone
        self.cache.invalidate(LISTINGS);
        Ok(())
    }

    pub async fn set_favorite(&self, listing_id: u64, favorite: bool) -> Result<(), ApiError> {
        let path = format!("{LISTINGS}/{listing_id}/favorite");
        let req = if favorite {
            ApiRequest::post_empty(path)
        } else {
            ApiRequest::delete(path)
        };
        self.run_mutation(req).await?;
        self.cache.invalidate_exact(FAVORITES);
        self.cache.invalidate(&format!("{LISTINGS}/{listing_id}"));
        Ok(())
    }

    pub async fn favorites(&self) -> Result<Page<Favorite>, ApiError> {
        let value = self.cached_get(FAVORITES, Vec::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// A created, edited or deleted listing can change any filtered catalog
    /// view, its own detail, its seller's review list and the favorites list.
    fn invalidate_listing(&self, id: u64, seller: Option<u64>) {
        self.cache.invalidate_exact(LISTINGS);
        self.cache.invalidate(&format!("{LISTINGS}/{id}"));
        self.cache.invalidate_exact(FAVORITES);
        if let Some(seller) = seller {
            self.cache.invalidate_exact(&format!("/reviews/seller/{seller}"));
        }
    }
}
