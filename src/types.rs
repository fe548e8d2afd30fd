//! Wire types, shaped field-for-field after the server's serializers. User
//! references always arrive as nested `{id, username}` objects, and listing
//! payloads come in two shapes: a flat summary on list endpoints and a fully
//! nested detail on single-listing endpoints (also returned by create and
//! update).

use serde::{Deserialize, Deserializer, Serialize};

/// Access/refresh credential pair as returned by login and registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Paginated envelope used by every list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: u64,
}

/// Public face of a user, embedded wherever the server references one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPublic {
    pub id: u64,
    pub username: String,
}

/// The authenticated user's own profile (`/profile/me`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub date_joined: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarModelRef {
    pub id: u64,
    pub name: String,
    pub make: MakeRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingImage {
    pub id: u64,
    pub image: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Catalog list entry. Make, model and location are flattened to their
/// names, there is no seller and no description, and `main_image` is the
/// first image's url if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: u64,
    pub title: String,
    #[serde(deserialize_with = "decimal")]
    pub price: f64,
    pub year: u32,
    pub mileage: u64,
    pub make: String,
    pub car_model: String,
    pub location: String,
    pub status: String,
    pub created_at: String,
    #[serde(default)]
    pub main_image: Option<String>,
}

/// Full single-listing payload, also the response body of create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDetail {
    pub id: u64,
    pub seller: UserPublic,
    pub make: MakeRef,
    pub car_model: CarModelRef,
    pub year: u32,
    #[serde(deserialize_with = "decimal")]
    pub price: f64,
    pub mileage: u64,
    pub transmission: String,
    pub fuel: String,
    pub body: String,
    pub drive: String,
    pub condition: String,
    pub color: String,
    pub location: LocationRef,
    pub owners_count: u32,
    #[serde(default)]
    pub vin: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub images: Vec<ListingImage>,
}

/// Favorites are paged as envelopes around a listing summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    pub id: u64,
    pub listing: ListingSummary,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub author: UserPublic,
    pub seller: UserPublic,
    pub rating: u8,
    #[serde(default)]
    pub text: String,
    /// Bare listing id; the reviewed listing may have been deleted since.
    #[serde(default)]
    pub listing: Option<u64>,
    pub created_at: String,
}

/// Trailing message shown in the conversation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePreview {
    pub id: u64,
    pub author: UserPublic,
    pub text: String,
    pub created_at: String,
}

/// A buyer/seller thread attached to one listing. `last_message` is present
/// on the list endpoint only; the detail endpoint omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: u64,
    pub seller: UserPublic,
    pub buyer: UserPublic,
    pub listing: ListingSummary,
    pub is_active: bool,
    #[serde(default)]
    pub last_message_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub last_message: Option<MessagePreview>,
}

/// Starting a conversation creates the thread and its first message in one
/// request; the server answers with both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStart {
    pub conversation: Conversation,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub author: UserPublic,
    pub text: String,
    pub created_at: String,
    #[serde(default)]
    pub read_at: Option<String>,
}

/// Decimal fields arrive as quoted strings ("2500000.00"); accept a plain
/// number as well.
fn decimal<'de, D>(de: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Conversation, ListingDetail, ListingSummary, Page, Review};

    fn summary_payload(id: u64) -> serde_json::Value {
        json!({
            "id": id,
            "title": "BMW 320i",
            "price": "2150000.00",
            "year": 2019,
            "mileage": 64000,
            "make": "BMW",
            "car_model": "320i",
            "location": "Moscow",
            "status": "APPROVED",
            "created_at": "2026-08-01T10:00:00Z",
            "main_image": null
        })
    }

    #[test]
    fn listing_summary_decodes_from_the_list_payload() {
        let page: Page<ListingSummary> =
            serde_json::from_value(json!({ "results": [summary_payload(1)], "count": 1 }))
                .unwrap();
        let item = &page.results[0];
        assert_eq!(item.price, 2_150_000.0);
        assert_eq!(item.car_model, "320i");
        assert!(item.main_image.is_none());
    }

    #[test]
    fn listing_detail_decodes_with_nested_references() {
        let detail: ListingDetail = serde_json::from_value(json!({
            "id": 5,
            "seller": { "id": 7, "username": "seller7" },
            "make": { "id": 1, "name": "BMW" },
            "car_model": { "id": 2, "name": "320i", "make": { "id": 1, "name": "BMW" } },
            "year": 2019,
            "price": "2150000.00",
            "mileage": 64000,
            "transmission": "AUTO",
            "fuel": "GASOLINE",
            "body": "SEDAN",
            "drive": "RWD",
            "condition": "USED",
            "color": "black",
            "location": { "id": 3, "name": "Moscow", "region": "" },
            "owners_count": 2,
            "vin": null,
            "title": "BMW 320i",
            "description": "",
            "status": "APPROVED",
            "rejection_reason": null,
            "created_at": "2026-08-01T10:00:00Z",
            "updated_at": "2026-08-01T10:00:00Z",
            "images": [
                { "id": 31, "image": "/media/listing_images/a.jpg", "order": 0,
                  "created_at": "2026-08-01T10:00:00Z" }
            ]
        }))
        .unwrap();

        assert_eq!(detail.seller.username, "seller7");
        assert_eq!(detail.car_model.make.name, "BMW");
        assert_eq!(detail.images.len(), 1);
    }

    #[test]
    fn review_decodes_with_nested_users_and_listing_id() {
        let review: Review = serde_json::from_value(json!({
            "id": 9,
            "author": { "id": 2, "username": "buyer2" },
            "seller": { "id": 7, "username": "seller7" },
            "rating": 5,
            "text": "great seller",
            "listing": 5,
            "created_at": "2026-08-02T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(review.seller.id, 7);
        assert_eq!(review.listing, Some(5));
    }

    #[test]
    fn conversation_decodes_with_and_without_last_message() {
        let listed: Conversation = serde_json::from_value(json!({
            "id": 3,
            "seller": { "id": 7, "username": "seller7" },
            "buyer": { "id": 2, "username": "buyer2" },
            "listing": summary_payload(5),
            "is_active": true,
            "last_message_at": "2026-08-03T09:00:00Z",
            "created_at": "2026-08-01T10:00:00Z",
            "last_message": {
                "id": 11,
                "author": { "id": 2, "username": "buyer2" },
                "text": "Still available?",
                "created_at": "2026-08-03T09:00:00Z"
            }
        }))
        .unwrap();
        assert_eq!(listed.last_message.unwrap().text, "Still available?");

        // detail endpoint omits the preview entirely
        let detail: Conversation = serde_json::from_value(json!({
            "id": 3,
            "seller": { "id": 7, "username": "seller7" },
            "buyer": { "id": 2, "username": "buyer2" },
            "listing": summary_payload(5),
            "is_active": true,
            "last_message_at": null,
            "created_at": "2026-08-01T10:00:00Z"
        }))
        .unwrap();
        assert!(detail.last_message.is_none());
    }

    #[test]
    fn numeric_price_is_accepted_too() {
        let mut payload = summary_payload(1);
        payload["price"] = json!(990000);
        let item: ListingSummary = serde_json::from_value(payload).unwrap();
        assert_eq!(item.price, 990_000.0);
    }
}
