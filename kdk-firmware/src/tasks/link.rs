//! Controller link task
//!
//! Owns the engine and the device adapters. Ticks the engine on every
//! tick signal, applies queued commands once the link is up and logs
//! state changes reported by the adapters.

use defmt::*;
use embassy_futures::select::{select, Either};
use portable_atomic::Ordering;

use kdk_core::{Engine, ParameterObserver};
use kdk_drivers::{FanCommand, FanController, LightCommand, LightController, LightKind};

use crate::channels::{DeviceCommand, COMMAND_CHANNEL, LINK_READY};
use crate::config::{LINK_CONFIG, WHITE_POINTS};
use crate::serial::UartPort;
use crate::tasks::tick::TICK_SIGNAL;

#[embassy_executor::task]
pub async fn link_task(port: UartPort) {
    info!("Link task started");

    let fan = FanController::new();
    let light = LightController::new(LightKind::Main, WHITE_POINTS);
    let night_light = LightController::new(LightKind::Night, WHITE_POINTS);

    let mut engine = Engine::new(port, LINK_CONFIG);
    let observers: [&dyn ParameterObserver; 3] = [&fan, &light, &night_light];
    for observer in observers {
        if engine.register_observer(observer).is_err() {
            warn!("Observer not registered");
        }
    }

    loop {
        match select(TICK_SIGNAL.wait(), COMMAND_CHANNEL.receive()).await {
            Either::First(now_ms) => {
                engine.tick(now_ms);

                let ready = engine.is_ready();
                if LINK_READY.swap(ready, Ordering::AcqRel) != ready {
                    let info = engine.device_info();
                    info!(
                        "Link ready={} model={} serial={}",
                        ready,
                        info.model.as_str(),
                        info.serial.as_str()
                    );
                }

                if let Some(state) = fan.take_update() {
                    info!("Fan: {}", state);
                }
                if let Some(state) = light.take_update() {
                    info!("Light: {}", state);
                }
                if let Some(state) = night_light.take_update() {
                    info!("Night light: {}", state);
                }
            }
            Either::Second(command) => {
                if !engine.is_ready() {
                    warn!("Link not ready, {} dropped", command);
                    continue;
                }

                let result = match command {
                    DeviceCommand::ToggleFan => {
                        let on = fan.state().is_some_and(|s| s.on);
                        let updates = fan.control(FanCommand {
                            on: Some(!on),
                            ..Default::default()
                        });
                        engine.queue_parameter_updates(&updates)
                    }
                    DeviceCommand::ToggleLight => {
                        let on = light.state().is_some_and(|s| s.on);
                        let updates = light.control(LightCommand {
                            on: Some(!on),
                            ..Default::default()
                        });
                        engine.queue_parameter_updates(&updates)
                    }
                };

                if let Err(e) = result {
                    warn!("{} not queued: {}", command, e);
                }
            }
        }
    }
}
