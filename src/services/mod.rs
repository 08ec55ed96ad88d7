// Business logic services

pub mod access;
pub mod coach_service;
pub mod content_filter;
pub mod exam_service;
pub mod gift_card_service;
pub mod pagination;
pub mod subscription_service;
pub mod workout_day_service;
pub mod workout_plan_service;
pub mod workout_schedule_service;

pub use coach_service::CoachService;
pub use content_filter::{ContentFilter, LexiconFilter};
pub use exam_service::ExamService;
pub use gift_card_service::GiftCardService;
pub use subscription_service::SubscriptionService;
pub use workout_day_service::WorkoutDayService;
pub use workout_plan_service::WorkoutPlanService;
pub use workout_schedule_service::WorkoutScheduleService;
