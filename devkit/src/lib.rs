/*!
# PuppetDB Exporter DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests de l'exporter sans PuppetDB réel :
- Stub PuppetDB en mémoire (nodes, métriques de rapport, pannes simulées)
- Builders de records et parsing de payloads PuppetDB
- Harness de cycle : aggregator + registry + horloge figée
*/

pub mod puppetdb_stub;
pub mod fixtures;
pub mod test_utils;

pub use puppetdb_stub::MockPuppetDb;
pub use fixtures::{metric, NodeBuilder};
pub use test_utils::TestHarness;
