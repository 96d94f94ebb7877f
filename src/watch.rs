use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};
use tracing::{debug, info};

use crate::monitor::MonitorItem;

/// Poll the brightness of the given monitors until a message (or disconnection) arrives on `stop`
///
/// `on_change` is called with the new value whenever a monitor's brightness differs from the previous poll
pub fn watch<F>(monitors: &[&dyn MonitorItem], interval: Duration, stop: &Receiver<()>, mut on_change: F)
where
  F: FnMut(&dyn MonitorItem, Option<u8>),
{
  for monitor in monitors {
    monitor.update_brightness();
  }

  let ticker = tick(interval);
  info!("watching {} monitor(s) every {:?}", monitors.len(), interval);

  loop {
    select! {
      recv(stop) -> _ => break,
      recv(ticker) -> _ => {
        for monitor in monitors {
          let before = monitor.brightness();
          monitor.update_brightness();
          let after = monitor.brightness();
          if after != before {
            debug!("brightness of {} changed from {:?} to {:?}", monitor.info().description, before, after);
            on_change(*monitor, after);
          }
        }
      }
    }
  }

  info!("stopped watching");
}
