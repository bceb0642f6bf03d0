/// One canned prompt exposed as a one-click button. The set is fixed at
/// build time and never mutated at runtime.
#[derive(Debug, Clone, Copy)]
pub struct QuickAction {
    pub label: &'static str,
    pub emoji: &'static str,
    pub prompt: &'static str,
}

pub const QUICK_ACTIONS: &[QuickAction] = &[
    QuickAction {
        label: "Dashboard summary",
        emoji: "📊",
        prompt: "Summarize the current health of my dashboards",
    },
    QuickAction {
        label: "Active alerts",
        emoji: "🚨",
        prompt: "List the alert rules that are currently firing",
    },
    QuickAction {
        label: "Recent errors",
        emoji: "📜",
        prompt: "Show recent error logs across all services",
    },
];
