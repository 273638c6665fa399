//! # Skilldex
//!
//! Audit, validation, and conversation-intelligence tooling for skill
//! marketplaces.
//!
//! Skilldex covers the marketplace QA workflow end to end: regex-driven
//! codebase auditors (quality, security, testing, context files), a
//! remediation planner that turns findings into a prioritized plan,
//! validators for the marketplace manifest, individual skills, and the
//! combined pre-release gate, plus a pipeline that parses session logs
//! into SQLite, embeds them, and serves semantic search and activity
//! reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Project tree │──▶│  Analyzers    │──▶│ Audit report  │
//! │ (any repo)   │   │ quality/sec/ │   │ + remediation │
//! └──────────────┘   │ test/context │   │    plan       │
//!                    └──────────────┘   └───────────────┘
//!
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Session logs │──▶│ Parse + hash │──▶│    SQLite      │
//! │   (JSONL)    │   │ + embed      │   │ search/reports│
//! └──────────────┘   └──────────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sdx audit ~/work/webapp       # scored findings report
//! sdx plan ~/work/webapp        # prioritized remediation plan
//! sdx validate release          # pre-release gate
//! sdx process                   # load session logs
//! sdx embed pending             # generate embeddings
//! sdx search "auth refactor"    # semantic search
//! sdx insights weekly           # activity report
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`audit`] | Audit engine, target discovery, report rendering |
//! | [`analyzer_quality`] | Code quality checks |
//! | [`analyzer_security`] | Secrets, vulnerable deps, JS anti-patterns |
//! | [`analyzer_testing`] | Test ratio and coverage thresholds |
//! | [`analyzer_context`] | Context/instruction file checks |
//! | [`plan`] | Remediation planner |
//! | [`frontmatter`] | SKILL.md frontmatter rules |
//! | [`validate_marketplace`] | Marketplace manifest validation |
//! | [`validate_skills`] | Skill quality scoring |
//! | [`validate_release`] | Combined pre-release gate |
//! | [`transcript`] | Session-log parsing and extraction |
//! | [`process`] | Transcript loading into SQLite |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Embedding backfill and rebuild |
//! | [`search`] | Semantic and keyword conversation search |
//! | [`insights`] | Activity reports |
//! | [`stats`] | Database health summary |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyzer_context;
pub mod analyzer_quality;
pub mod analyzer_security;
pub mod analyzer_testing;
pub mod audit;
pub mod config;
pub mod db;
pub mod embedding;
pub mod frontmatter;
pub mod index;
pub mod insights;
pub mod migrate;
pub mod models;
pub mod plan;
pub mod process;
pub mod search;
pub mod stats;
pub mod transcript;
pub mod validate_marketplace;
pub mod validate_release;
pub mod validate_skills;
