pub mod personality;

pub use personality::PersonalityProfile;
