//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Step indicators
pub static CACHED: Emoji<'_, '_> = Emoji("💾 ", "[C]");
pub static REPLAYED: Emoji<'_, '_> = Emoji("⏪ ", "[R]");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[~]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
