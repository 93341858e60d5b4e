//! Bevy integration: the [`ReplicationContext`] lives in a resource and is ticked by a system
use bevy_app::{App, FixedUpdate, Plugin};
use bevy_ecs::prelude::*;
use bevy_ecs::schedule::{InternedScheduleLabel, ScheduleLabel};
use bevy_time::{Time, TimePlugin};

use crate::ReplicationSystems;
use crate::config::ReplicationConfig;
use crate::registry::{ReplicationContext, Role};

pub struct ReplicationPlugin {
    pub role: Role,
    pub config: ReplicationConfig,
    /// Schedule in which the network tick runs
    pub tick_schedule: InternedScheduleLabel,
}

impl ReplicationPlugin {
    pub fn new(role: Role, config: ReplicationConfig) -> Self {
        Self {
            role,
            config,
            tick_schedule: FixedUpdate.intern(),
        }
    }

    pub fn with_tick_schedule(mut self, schedule: impl ScheduleLabel) -> Self {
        self.tick_schedule = schedule.intern();
        self
    }
}

/// Advance every object, queue the updates written since the last tick, then expire the
/// recently forgotten ids
pub fn network_tick(time: Res<Time>, mut context: ResMut<ReplicationContext>) {
    context.network_update(time.delta_secs());
    context.sweep_recently_forgotten();
}

impl Plugin for ReplicationPlugin {
    fn build(&self, app: &mut App) {
        if !app.is_plugin_added::<TimePlugin>() {
            app.add_plugins(TimePlugin);
        }
        app.insert_resource(ReplicationContext::new(self.role, self.config.clone()));
        app.configure_sets(self.tick_schedule, ReplicationSystems::Tick);
        app.add_systems(
            self.tick_schedule,
            network_tick.in_set(ReplicationSystems::Tick),
        );
    }
}
