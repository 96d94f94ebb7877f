use wmi::{COMLibrary, WMIConnection, WMIError};

use crate::error::{MonitorError, Result};
use crate::monitor::wmi::{
  BrightnessInstance, BrightnessMethods, DesktopMonitor, QueryRows, SetBrightnessParams, WmiSource
};

const CIMV2_NAMESPACE: &str = r"root\cimv2";
const WMI_NAMESPACE: &str = r"root\wmi";
const SET_BRIGHTNESS_METHOD: &str = "WmiSetBrightness";

// WBEM_E_NOT_SUPPORTED, returned by WmiMonitorBrightness queries issued right after resume
const WBEM_E_NOT_SUPPORTED: i32 = 0x8004_100C_u32 as i32;

/// [`WmiSource`] backed by the live WMI service
///
/// Every call opens its own connection on the calling thread, so the source can be shared across threads even though
/// COM interfaces cannot.
#[derive(Debug, Default, Clone, Copy)]
pub struct WmiConnectionSource;

impl WmiConnectionSource {
  fn connect(namespace: &str) -> Result<WMIConnection> {
    let com = COMLibrary::new().map_err(|err| wmi_error("COM initialization", err))?;
    WMIConnection::with_namespace_path(namespace, com).map_err(|err| wmi_error("connection", err))
  }
}

fn wmi_error(operation: &'static str, err: WMIError) -> MonitorError {
  MonitorError::Wmi { operation, message: err.to_string() }
}

fn brightness_query_error(err: WMIError) -> MonitorError {
  match err {
    WMIError::HResultError { hres } if hres == WBEM_E_NOT_SUPPORTED => {
      MonitorError::WmiNotSupported("WmiMonitorBrightness")
    }
    err => wmi_error("WmiMonitorBrightness query", err),
  }
}

/// `exec_instance_method` takes the object path first, then the method name
fn object_path(methods: &BrightnessMethods) -> &str {
  &methods.path
}

impl WmiSource for WmiConnectionSource {
  fn desktop_monitors(&self) -> Result<Vec<DesktopMonitor>> {
    Self::connect(CIMV2_NAMESPACE)?
      .raw_query("SELECT PNPDeviceID, Description FROM Win32_DesktopMonitor")
      .map_err(|err| wmi_error("Win32_DesktopMonitor query", err))
  }

  fn brightness_instances(&self) -> Result<QueryRows<BrightnessInstance>> {
    let connection = Self::connect(WMI_NAMESPACE)?;
    let instances = connection
      .exec_query("SELECT InstanceName, CurrentBrightness, Level FROM WmiMonitorBrightness")
      .map_err(brightness_query_error)?;

    let mut rows = Vec::new();
    for instance in instances {
      match instance.and_then(|instance| instance.into_desr::<BrightnessInstance>()) {
        Ok(row) => rows.push(row),
        Err(err) => match brightness_query_error(err) {
          interrupted @ MonitorError::WmiNotSupported(_) => {
            return Ok(QueryRows { rows, interrupted: Some(interrupted) });
          }
          err => return Err(err),
        },
      }
    }

    Ok(QueryRows::complete(rows))
  }

  fn brightness_methods(&self) -> Result<Vec<BrightnessMethods>> {
    Self::connect(WMI_NAMESPACE)?
      .raw_query("SELECT * FROM WmiMonitorBrightnessMethods")
      .map_err(|err| wmi_error("WmiMonitorBrightnessMethods query", err))
  }

  fn invoke_set_brightness(&self, methods: &BrightnessMethods, params: SetBrightnessParams) -> Result<()> {
    Self::connect(WMI_NAMESPACE)?
      .exec_instance_method::<BrightnessMethods, ()>(object_path(methods), SET_BRIGHTNESS_METHOD, params)
      .map_err(|err| wmi_error(SET_BRIGHTNESS_METHOD, err))
  }
}
