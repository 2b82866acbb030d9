mod m0001_core_tables;
mod m0002_user_profiles;

use cetane::prelude::MigrationRegistry;

pub fn registry() -> MigrationRegistry {
    let mut reg = MigrationRegistry::new();
    reg.register(m0001_core_tables::migration());
    reg.register(m0002_user_profiles::migration());
    reg
}
