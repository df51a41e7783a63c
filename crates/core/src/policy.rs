//! The standard desired-state policy: static rule tables per backend
//! family and resource kind, plus the marker strings that gate exclusions
//! and tier exemptions.
//!
//! Built once at startup via [`Policy::standard`] and passed explicitly to
//! every component; there is no ambient global configuration.

use serde_json::json;

use crate::rule::{Check, MissingPolicy, Rule, RuleSet, RuleSetError, WritePolicy};

/// The two supported backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// JSON configuration documents over a token-header scheme.
    Emby,
    /// XML preference listing with form-encoded single-field writes.
    Plex,
}

impl Family {
    /// The path segment the directory service uses for family-specific
    /// endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Emby => "emby",
            Family::Plex => "plex",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resource kinds the reconciler knows how to read and rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Per-library video analysis options (chapter images, markers).
    LibraryVideo,
    /// Per-library metadata options (refresh, monitoring, collections).
    LibraryMetadata,
    /// Server-wide settings document.
    ServerSettings,
    /// Transcoding/encoding settings document.
    EncodingSettings,
    /// A scheduled task's interval configuration.
    TaskSchedule,
    /// A scheduled task's trigger list.
    TaskTriggers,
    /// A user's permission policy document.
    UserPolicy,
    /// A user's home-screen layout configuration.
    UserHomeScreen,
    /// The flat server preference listing (XML family).
    Preferences,
}

/// Scheduled-task intervals are expressed in 100-nanosecond ticks; the
/// library scan must run no more often than every three hours.
pub const THREE_HOURS_TICKS: i64 = 3 * 60 * 60 * 10_000_000;

/// Minimum scheduled-scan interval for the XML family, in seconds.
pub const MIN_SCAN_INTERVAL_SECS: i64 = 7200;

/// Immutable desired-state policy for the whole fleet.
#[derive(Debug, Clone)]
pub struct Policy {
    exclusion_marker: String,
    exempt_markers: Vec<String>,
    library_video: RuleSet,
    library_metadata: RuleSet,
    server_settings: RuleSet,
    encoding: RuleSet,
    task_schedule: RuleSet,
    task_triggers: RuleSet,
    user_policy: RuleSet,
    user_home_screen: RuleSet,
    preferences: RuleSet,
}

impl Policy {
    /// Build the standard policy tables.
    ///
    /// Fails only if a table carries two rules for the same field, which a
    /// release build should treat as a startup error rather than silently
    /// letting evaluation order pick a winner.
    pub fn standard() -> Result<Self, RuleSetError> {
        let off = || Check::Equals;

        let library_video = RuleSet::new(
            vec![
                Rule::new("ExtractChapterImagesDuringLibraryScan", json!(false), off()),
                Rule::new("EnableChapterImageExtraction", json!(false), off()),
                Rule::new("EnableMarkerDetectionDuringLibraryScan", json!(false), off()),
                Rule::new("EnableMarkerDetection", json!(false), off()),
            ],
            WritePolicy::Always,
        )?;

        let library_metadata = RuleSet::new(
            vec![
                Rule::new("AutomaticRefreshIntervalDays", json!(0), Check::Equals)
                    .on_missing(MissingPolicy::Compliant),
                Rule::new("EnableRealtimeMonitor", json!(false), off()).exemptable(),
                Rule::new("ImportCollections", json!(false), off()),
            ],
            WritePolicy::Always,
        )?;

        let server_settings = RuleSet::new(
            vec![
                Rule::new("DatabaseCacheSizeMB", json!(600), Check::Equals),
                Rule::new("DatabaseAnalysisLimit", json!(400), Check::Equals),
                Rule::new("EnableUPnP", json!(false), off()),
            ],
            WritePolicy::Always,
        )?;

        let encoding = RuleSet::new(
            vec![Rule::new("EnableThrottling", json!(true), Check::Equals)],
            WritePolicy::Always,
        )?;

        let task_schedule = RuleSet::new(
            vec![Rule::new(
                "IntervalTicks",
                json!(THREE_HOURS_TICKS),
                Check::MinInt(THREE_HOURS_TICKS),
            )
            .exemptable()],
            WritePolicy::OnChange,
        )?;

        let task_triggers = RuleSet::new(
            vec![Rule::new("Triggers", json!([]), Check::Equals)
                .on_missing(MissingPolicy::Compliant)],
            WritePolicy::OnChange,
        )?;

        let user_policy = RuleSet::new(
            vec![
                Rule::new("EnableSubtitleDownloading", json!(true), Check::Equals),
                Rule::new("EnableContentDownloading", json!(true), Check::Equals),
                Rule::new(
                    "EnableContentDownloadingForPhotoAlbums",
                    json!(true),
                    Check::Equals,
                ),
                Rule::new("EnableAllDevices", json!(true), Check::Equals)
                    .on_missing(MissingPolicy::Compliant),
            ],
            WritePolicy::OnChange,
        )?;

        let user_home_screen = RuleSet::new(
            vec![Rule::new(
                "HomeScreenSections",
                home_screen_sections(),
                Check::Equals,
            )],
            WritePolicy::OnChange,
        )?;

        let never = || Check::AnyOf(vec![json!("never"), json!("0")]);
        let preferences = RuleSet::new(
            vec![
                Rule::new(
                    "ScheduledLibraryUpdateInterval",
                    json!("7200"),
                    Check::MinInt(MIN_SCAN_INTERVAL_SECS),
                )
                .on_missing(MissingPolicy::Skip)
                .exemptable(),
                Rule::new(
                    "FSEventLibraryUpdatesEnabled",
                    json!("0"),
                    Check::NotEquals(json!("1")),
                )
                .on_missing(MissingPolicy::Skip),
                Rule::new("ScannerLowPriority", json!("1"), Check::Equals)
                    .on_missing(MissingPolicy::Skip),
                Rule::new("TranscoderQuality", json!("1"), Check::Equals)
                    .on_missing(MissingPolicy::Skip),
                Rule::new("GenerateBIFBehavior", json!("never"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("GenerateIntroMarkerBehavior", json!("never"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("GenerateCreditsMarkerBehavior", json!("never"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("GenerateAdMarkerBehavior", json!("never"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("GenerateVADBehavior", json!("never"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("GenerateChapterThumbBehavior", json!("never"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("LoudnessAnalysisBehavior", json!("never"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("MusicAnalysisBehavior", json!("never"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("ButlerTaskUpgradeMediaAnalysis", json!("0"), never())
                    .on_missing(MissingPolicy::Skip),
                Rule::new("ButlerTaskDeepMediaAnalysis", json!("0"), never())
                    .on_missing(MissingPolicy::Skip),
            ],
            WritePolicy::OnChange,
        )?;

        Ok(Policy {
            exclusion_marker: "xxx".to_string(),
            exempt_markers: vec!["baremetal".to_string(), "unlimited".to_string()],
            library_video,
            library_metadata,
            server_settings,
            encoding,
            task_schedule,
            task_triggers,
            user_policy,
            user_home_screen,
            preferences,
        })
    }

    /// The rule table for a resource kind.
    pub fn rules_for(&self, kind: ResourceKind) -> &RuleSet {
        match kind {
            ResourceKind::LibraryVideo => &self.library_video,
            ResourceKind::LibraryMetadata => &self.library_metadata,
            ResourceKind::ServerSettings => &self.server_settings,
            ResourceKind::EncodingSettings => &self.encoding,
            ResourceKind::TaskSchedule => &self.task_schedule,
            ResourceKind::TaskTriggers => &self.task_triggers,
            ResourceKind::UserPolicy => &self.user_policy,
            ResourceKind::UserHomeScreen => &self.user_home_screen,
            ResourceKind::Preferences => &self.preferences,
        }
    }

    /// Resources whose name carries the exclusion marker are skipped
    /// entirely, for every rule (case-insensitive substring match).
    pub fn is_excluded(&self, resource_name: &str) -> bool {
        resource_name
            .to_lowercase()
            .contains(&self.exclusion_marker)
    }

    /// Whether a tier classifier string marks the server as exempt
    /// (case-insensitive substring match against any exemption marker).
    pub fn is_exempt_tier(&self, classifier: &str) -> bool {
        let classifier = classifier.to_lowercase();
        self.exempt_markers.iter().any(|m| classifier.contains(m))
    }
}

/// The standard five-section home screen layout, in display order.
fn home_screen_sections() -> serde_json::Value {
    json!([
        {"Type": "librarytiles", "Name": "My Media"},
        {"Type": "resume", "Name": "Continue Watching"},
        {"Type": "latestmedia", "Name": "Latest Media"},
        {"Type": "recentlyreleasedmovies", "Name": "Recently Released Movies"},
        {"Type": "collections", "Name": "Collections"}
    ])
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
