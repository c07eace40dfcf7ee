// Tests module
// Orchestration: end-to-end devnets on the embedded dev node
// Control channel: secrets and bearer-token enforcement
// Doubles: engines that fail or stall on demand
