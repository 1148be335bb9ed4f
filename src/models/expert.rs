use mongodb::bson::{oid::ObjectId, DateTime};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct TimeSlot {
    // "HH:MM"
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct DaySchedule {
    pub day: String,
    pub available: bool,
    pub slots: Vec<TimeSlot>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Availability {
    pub time_zone: String,
    pub weekly_schedule: Vec<DaySchedule>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Expert {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub title: String,
    pub bio: String,
    pub expertise: Vec<String>,
    pub hourly_rate: Option<f64>,
    pub currency: String,
    pub languages: Vec<String>,
    pub availability: Option<Availability>,
    // Derived aggregates, written only by the rating cascade
    pub rating: f64,
    pub total_reviews: i64,
    pub service_count: i64,
    pub total_bookings: i64,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateExpertDto {
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub bio: String,
    #[validate(length(min = 1))]
    pub expertise: Vec<String>,
    #[validate(range(min = 0.0))]
    pub hourly_rate: Option<f64>,
    pub currency: Option<String>,
    pub languages: Option<Vec<String>>,
    pub availability: Option<Availability>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateExpertDto {
    #[validate(length(min = 1, max = 120))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub bio: Option<String>,
    pub expertise: Option<Vec<String>>,
    #[validate(range(min = 0.0))]
    pub hourly_rate: Option<f64>,
    pub currency: Option<String>,
    pub languages: Option<Vec<String>>,
    pub availability: Option<Availability>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateExpertiseDto {
    #[validate(length(min = 1))]
    pub expertise: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateAvailabilityDto {
    pub availability: Availability,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct ExpertListQuery {
    pub expertise: Option<String>,
    pub language: Option<String>,
    pub min_rating: Option<f64>,
    pub sort_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::to_document;

    #[test]
    fn availability_serializes_for_storage() {
        let availability = Availability {
            time_zone: "UTC".to_string(),
            weekly_schedule: vec![DaySchedule {
                day: "Monday".to_string(),
                available: true,
                slots: vec![TimeSlot {
                    start_time: "09:00".to_string(),
                    end_time: "12:00".to_string(),
                }],
            }],
        };

        let doc = to_document(&availability).unwrap();
        assert_eq!(doc.get_str("time_zone").unwrap(), "UTC");
        let schedule = doc.get_array("weekly_schedule").unwrap();
        assert_eq!(schedule.len(), 1);
        let monday = schedule[0].as_document().unwrap();
        assert_eq!(monday.get_str("day").unwrap(), "Monday");
        assert_eq!(
            monday.get_array("slots").unwrap()[0]
                .as_document()
                .unwrap()
                .get_str("start_time")
                .unwrap(),
            "09:00"
        );
    }
}
