//! # readsync
//!
//! One-way sync of tagged Readwise Reader documents and their highlights
//! into a Feishu Bitable.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Readwise   │──▶│ FieldMapper │──▶│  reconcile  │──▶│   Bitable    │
//! │ docs + hl's  │   │   Record    │   │ ins/upd/skip│   │ insert/update│
//! └──────────────┘   └─────────────┘   └──────▲──────┘   └──────────────┘
//!                                             │
//!                                    Bitable rows (by URL)
//! ```
//!
//! Rows are matched by source URL. A document whose URL is not in the table
//! is inserted; one whose rendered highlight block differs from the stored
//! block has its highlight column updated; everything else is skipped.
//! Nothing is ever deleted.
//!
//! ## Quick Start
//!
//! ```bash
//! export READWISE_TOKEN=... FEISHU_APP_ID=... FEISHU_APP_SECRET=...
//! export FEISHU_APP_TOKEN=... FEISHU_TABLE_ID=...
//! readsync check                  # verify settings, no network
//! readsync preview --limit 3      # fetch and show mapped records
//! readsync sync --dry-run         # plan only
//! readsync sync                   # write to the table
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`mapper`] | Document → record mapping |
//! | [`reconcile`] | Insert/update/skip classification |
//! | [`traits`] | Source and row-store seams |
//! | [`connector_readwise`] | Readwise Reader source |
//! | [`connector_bitable`] | Feishu Bitable store |
//! | [`sync`] | Pipeline orchestration |

pub mod check;
pub mod config;
pub mod connector_bitable;
pub mod connector_readwise;
pub mod mapper;
pub mod models;
pub mod preview;
pub mod reconcile;
pub mod sync;
pub mod traits;
