//! The Handie product catalog: steps, badges, and achievements served by
//! the binary.

use super::model::{Achievement, Badge, BadgeCriteria, Role};
use super::registry::{COMPLETION_STEP, ROLE_SELECTION_STEP, StepDefinition, StepRegistry};
use super::rules::{self, StepValidator};

impl StepRegistry {
    /// The default Handie onboarding flow.
    pub fn handie_default() -> Self {
        StepRegistry::builder()
            // ── Core ──
            .core(
                StepDefinition::new("welcome", "Welcome to Handie", 1)
                    .describe("Let's get you started with your account setup")
                    .estimate(2)
                    .validated_by(StepValidator::custom(rules::welcome_started)),
            )
            .core(
                StepDefinition::new(ROLE_SELECTION_STEP, "Choose Your Role", 2)
                    .describe("Are you looking for services or providing them?")
                    .estimate(3)
                    .skippable()
                    .validated_by(StepValidator::Fields(rules::role_rules())),
            )
            .core(
                StepDefinition::new("profile-setup", "Profile Setup", 3)
                    .describe("Tell us about yourself")
                    .estimate(5)
                    .validated_by(StepValidator::Fields(rules::profile_rules())),
            )
            // ── Customer ──
            .role_step(
                Role::Customer,
                StepDefinition::new("customer-location-setup", "Your Address", 4)
                    .describe("Add your address for service delivery")
                    .estimate(3)
                    .for_roles(&[Role::Customer])
                    .validated_by(StepValidator::Fields(rules::address_rules())),
            )
            // ── Expert ──
            .role_step(
                Role::Expert,
                StepDefinition::new("verification", "Identity Verification", 4)
                    .describe("Verify your identity and credentials")
                    .estimate(10)
                    .for_roles(&[Role::Expert])
                    .validated_by(StepValidator::Fields(rules::verification_rules())),
            )
            .role_step(
                Role::Expert,
                StepDefinition::new("service-selection", "Service Categories", 5)
                    .describe("Select the services you want to offer")
                    .estimate(5)
                    .for_roles(&[Role::Expert])
                    .validated_by(StepValidator::Fields(rules::non_empty_list_rules(
                        "selectedCategories",
                    ))),
            )
            .role_step(
                Role::Expert,
                StepDefinition::new("expert-location-setup", "Service Areas", 6)
                    .describe("Set your service areas and coverage")
                    .estimate(4)
                    .for_roles(&[Role::Expert])
                    .validated_by(StepValidator::Fields(rules::non_empty_list_rules(
                        "serviceAreas",
                    ))),
            )
            .role_step(
                Role::Expert,
                StepDefinition::new("availability", "Availability Setup", 7)
                    .describe("Set your working hours and availability")
                    .estimate(3)
                    .for_roles(&[Role::Expert])
                    .validated_by(StepValidator::custom(rules::any_day_available)),
            )
            // ── Admin ──
            .role_step(
                Role::Admin,
                StepDefinition::new("admin-setup", "Admin Configuration", 4)
                    .describe("Configure admin settings and permissions")
                    .estimate(8)
                    .for_roles(&[Role::Admin]),
            )
            // ── Optional ──
            .optional(
                StepDefinition::new("preferences", "Service Preferences", 4)
                    .describe("What services are you interested in?")
                    .estimate(4)
                    .optional()
                    .for_roles(&[Role::Customer]),
            )
            .optional(
                StepDefinition::new("notifications", "Notification Preferences", 8)
                    .describe("Customize your notification settings")
                    .estimate(2)
                    .optional(),
            )
            .optional(
                StepDefinition::new("privacy", "Privacy Settings", 9)
                    .describe("Configure your privacy preferences")
                    .estimate(3)
                    .optional(),
            )
            // ── Verification ──
            .verification(
                StepDefinition::new("phone-verification", "Phone Verification", 10)
                    .describe("Verify your phone number")
                    .estimate(2)
                    .optional()
                    .requires(&["profile-setup"]),
            )
            .verification(
                StepDefinition::new("email-verification", "Email Verification", 11)
                    .describe("Verify your email address")
                    .estimate(1)
                    .optional()
                    .requires(&["profile-setup"]),
            )
            .completion(
                StepDefinition::new(COMPLETION_STEP, "Setup Complete", 99)
                    .describe("Welcome to Handie!")
                    .estimate(1),
            )
            // ── Gamification ──
            .badge(Badge::new(
                "speed-demon",
                "Speed Demon",
                "Completed onboarding in under 10 minutes",
                "⚡",
                BadgeCriteria::TimeLimit { minutes: 10 },
            ))
            .badge(Badge::new(
                "perfectionist",
                "Perfectionist",
                "Completed all steps without skipping any",
                "🎯",
                BadgeCriteria::NoSkips,
            ))
            .badge(Badge::new(
                "explorer",
                "Explorer",
                "Visited all optional steps",
                "🗺️",
                BadgeCriteria::Manual,
            ))
            .badge(Badge::new(
                "early-bird",
                "Early Bird",
                "Completed onboarding on the first day",
                "🐦",
                BadgeCriteria::Manual,
            ))
            .badge(Badge::new(
                "detail-oriented",
                "Detail Oriented",
                "Completed all verification steps",
                "🔍",
                BadgeCriteria::StepCompleted {
                    step_id: "verification".into(),
                },
            ))
            .achievement(Achievement::new(
                "profile-completion",
                "Profile Master",
                "Complete your profile setup",
                "👤",
            ))
            .achievement(Achievement::new(
                "service-setup",
                "Service Expert",
                "Set up your services",
                "🛠️",
            ))
            .achievement(Achievement::new(
                "verification-complete",
                "Verified Professional",
                "Complete identity verification",
                "✅",
            ))
            .achievement(Achievement::new(
                "location-setup",
                "Location Master",
                "Set up your location preferences",
                "📍",
            ))
            .trigger("profile-completion", "profile-setup")
            .trigger("service-setup", "service-selection")
            .trigger("verification-complete", "verification")
            .trigger("location-setup", "customer-location-setup")
            .trigger("location-setup", "expert-location-setup")
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(registry: &StepRegistry, role: Role) -> Vec<String> {
        registry
            .steps_for_role(role)
            .unwrap()
            .iter()
            .map(|s| s.id.clone())
            .collect()
    }

    #[test]
    fn default_catalog_is_valid() {
        let registry = StepRegistry::handie_default();
        let report = registry.validate_config();
        assert!(report.is_valid, "{:?}", report.errors);
    }

    #[test]
    fn every_role_ends_with_completion_in_strict_order() {
        let registry = StepRegistry::handie_default();
        for role in Role::ALL {
            let steps = registry.steps_for_role(role).unwrap();
            assert!(!steps.is_empty());
            assert_eq!(steps.last().unwrap().id, COMPLETION_STEP);
            assert!(steps.windows(2).all(|w| w[0].order < w[1].order), "{role}");
        }
    }

    #[test]
    fn role_step_lists() {
        let registry = StepRegistry::handie_default();
        assert_eq!(
            ids(&registry, Role::Customer),
            vec![
                "welcome",
                "role-selection",
                "profile-setup",
                "customer-location-setup",
                "completion"
            ]
        );
        assert_eq!(
            ids(&registry, Role::Expert),
            vec![
                "welcome",
                "role-selection",
                "profile-setup",
                "verification",
                "service-selection",
                "expert-location-setup",
                "availability",
                "completion"
            ]
        );
        assert_eq!(
            ids(&registry, Role::Admin),
            vec![
                "welcome",
                "role-selection",
                "profile-setup",
                "admin-setup",
                "completion"
            ]
        );
    }

    #[test]
    fn catalog_validators_follow_product_rules() {
        let registry = StepRegistry::handie_default();
        let step = |id| registry.step_by_id(id, Role::Expert).unwrap();

        assert!(step("welcome").validate(&json!({"started": true})));
        assert!(!step("welcome").validate(&json!({})));

        assert!(!step("profile-setup").validate(&json!({
            "lastName": "Rao", "email": "asha@example.com", "phone": "9876543210"
        })));
        assert!(step("profile-setup").validate(&json!({
            "firstName": "Asha", "lastName": "Rao",
            "email": "asha@example.com", "phone": "9876543210"
        })));

        assert!(!step("service-selection").validate(&json!({"selectedCategories": []})));
        assert!(step("service-selection").validate(&json!({"selectedCategories": ["plumbing"]})));

        assert!(step("availability").validate(&json!({
            "monday": {"available": false}, "friday": {"available": true}
        })));
        assert!(!step("availability").validate(&json!({"monday": {"available": false}})));
    }

    #[test]
    fn optional_and_verification_steps_are_skippable_extras() {
        let registry = StepRegistry::handie_default();
        let extras = registry.optional_steps_for_role(Role::Customer);
        assert_eq!(extras.len(), 5);
        assert!(extras.iter().all(|s| !s.is_required && s.is_skippable));
        // service preferences are offered to customers only
        assert_eq!(registry.optional_steps_for_role(Role::Expert).len(), 4);
        assert!(registry.step_by_id("preferences", Role::Expert).is_none());
    }

    #[test]
    fn default_settings_and_gamification_catalog() {
        let registry = StepRegistry::handie_default();
        let settings = registry.settings();
        assert!(settings.allow_skip && settings.allow_pause && settings.auto_save);
        assert_eq!(settings.save_interval_secs, 30);
        assert_eq!(registry.badges().len(), 5);
        assert_eq!(registry.achievements().len(), 4);
        assert_eq!(
            registry.badge("speed-demon").unwrap().criteria,
            BadgeCriteria::TimeLimit { minutes: 10 }
        );
        assert_eq!(
            registry.badge("detail-oriented").unwrap().criteria,
            BadgeCriteria::StepCompleted {
                step_id: "verification".into()
            }
        );
        let location: Vec<&str> = registry
            .triggers()
            .iter()
            .filter(|t| t.achievement_id == "location-setup")
            .map(|t| t.step_id.as_str())
            .collect();
        assert_eq!(location, vec!["customer-location-setup", "expert-location-setup"]);
    }
}
