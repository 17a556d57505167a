use super::{
    AccessoryEndpoints, BusLocation, UsbBackend, UsbDeviceInfo, UsbError, UsbHandle, AOA_START,
    GOOGLE_VENDOR_ID,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const MAX_MOCK_READ_WAIT: u64 = 5; // ms

/// In-memory device handle recording every transfer
#[derive(Clone)]
pub(crate) struct MockHandle {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    protocol_version: Mutex<u16>,
    control_writes: Mutex<Vec<(u8, u16, Vec<u8>)>>,
    bulk_writes: Mutex<Vec<Vec<u8>>>,
    incoming: Mutex<VecDeque<Result<Vec<u8>, UsbError>>>,
    started: AtomicBool,
    gone: AtomicBool,
}

impl MockHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
        }
    }

    pub(crate) fn set_protocol_version(&self, version: u16) {
        *self.state.protocol_version.lock().unwrap() = version;
    }

    /// (request, index, data) of every vendor control write
    pub(crate) fn control_writes(&self) -> Vec<(u8, u16, Vec<u8>)> {
        self.state.control_writes.lock().unwrap().clone()
    }

    pub(crate) fn bulk_writes(&self) -> Vec<Vec<u8>> {
        self.state.bulk_writes.lock().unwrap().clone()
    }

    /// Queues bytes to be returned by the next bulk read
    pub(crate) fn push_incoming(&self, data: Vec<u8>) {
        self.state.incoming.lock().unwrap().push_back(Ok(data));
    }

    pub(crate) fn push_error(&self, err: UsbError) {
        self.state.incoming.lock().unwrap().push_back(Err(err));
    }

    pub(crate) fn started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Makes every further transfer fail as if the device was unplugged
    pub(crate) fn unplug(&self) {
        self.state.gone.store(true, Ordering::SeqCst);
    }

    fn check_present(&self) -> Result<(), UsbError> {
        if self.state.gone.load(Ordering::SeqCst) {
            return Err(UsbError::NoDevice);
        }

        Ok(())
    }
}

impl UsbHandle for MockHandle {
    fn read_control(
        &self,
        _request_type: u8,
        _request: u8,
        _value: u16,
        _index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.check_present()?;
        let version = *self.state.protocol_version.lock().unwrap();
        buf[0] = (version & 0xff) as u8;
        buf[1] = (version >> 8) as u8;

        Ok(2)
    }

    fn write_control(
        &self,
        _request_type: u8,
        request: u8,
        _value: u16,
        index: u16,
        buf: &[u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.check_present()?;
        self.state
            .control_writes
            .lock()
            .unwrap()
            .push((request, index, buf.to_vec()));

        if request == AOA_START {
            self.state.started.store(true, Ordering::SeqCst);
        }

        Ok(buf.len())
    }

    fn claim_accessory(&mut self) -> Result<AccessoryEndpoints, UsbError> {
        self.check_present()?;

        Ok(AccessoryEndpoints {
            interface: 0,
            bulk_in: 0x81,
            bulk_out: 0x01,
        })
    }

    fn read_bulk(
        &self,
        _endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.check_present()?;

        let next = self.state.incoming.lock().unwrap().pop_front();

        match next {
            Some(Ok(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(Err(err)) => Err(err),
            None => {
                thread::sleep(timeout.min(Duration::from_millis(MAX_MOCK_READ_WAIT)));
                Err(UsbError::Timeout)
            }
        }
    }

    fn write_bulk(&self, _endpoint: u8, buf: &[u8], _timeout: Duration) -> Result<usize, UsbError> {
        self.check_present()?;
        self.state.bulk_writes.lock().unwrap().push(buf.to_vec());

        Ok(buf.len())
    }
}

struct MockDevice {
    info: UsbDeviceInfo,
    handle: MockHandle,
    /// The accessory this device re-enumerates as once started
    accessory: Option<(UsbDeviceInfo, MockHandle)>,
    open_failures: u32,
}

/// Simulated bus. Android devices re-enumerate as accessories
/// once they received the start request.
pub(crate) struct MockBackend {
    devices: Mutex<Vec<MockDevice>>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            devices: Mutex::new(vec![]),
        }
    }

    pub(crate) fn add_accessory(&self, address: u8, serial: &str) -> MockHandle {
        let handle = MockHandle::new();

        self.devices.lock().unwrap().push(MockDevice {
            info: UsbDeviceInfo {
                location: BusLocation { bus: 1, address },
                vendor_id: GOOGLE_VENDOR_ID,
                product_id: 0x2D01,
                serial: Some(serial.to_owned()),
            },
            handle: handle.clone(),
            accessory: None,
            open_failures: 0,
        });

        handle
    }

    /// Returns the handle used for the mode switch and the accessory handle
    pub(crate) fn add_android(&self, address: u8, vendor_id: u16, serial: &str) -> (MockHandle, MockHandle) {
        let handle = MockHandle::new();
        handle.set_protocol_version(2);
        let accessory = MockHandle::new();

        self.devices.lock().unwrap().push(MockDevice {
            info: UsbDeviceInfo {
                location: BusLocation { bus: 1, address },
                vendor_id,
                product_id: 0x6860,
                serial: Some(serial.to_owned()),
            },
            handle: handle.clone(),
            accessory: Some((
                UsbDeviceInfo {
                    location: BusLocation {
                        bus: 1,
                        address: address.wrapping_add(100),
                    },
                    vendor_id: GOOGLE_VENDOR_ID,
                    product_id: 0x2D01,
                    serial: Some(serial.to_owned()),
                },
                accessory.clone(),
            )),
            open_failures: 0,
        });

        (handle, accessory)
    }

    pub(crate) fn add_other(&self, address: u8, vendor_id: u16, product_id: u16) {
        self.devices.lock().unwrap().push(MockDevice {
            info: UsbDeviceInfo {
                location: BusLocation { bus: 1, address },
                vendor_id,
                product_id,
                serial: None,
            },
            handle: MockHandle::new(),
            accessory: None,
            open_failures: 0,
        });
    }

    /// The next `count` opens of the device at `address` fail with `Busy`
    pub(crate) fn fail_opens(&self, address: u8, count: u32) {
        for device in self.devices.lock().unwrap().iter_mut() {
            if device.info.location.address == address {
                device.open_failures = count;
            }
        }
    }
}

impl MockDevice {
    fn current(&self) -> (&UsbDeviceInfo, &MockHandle) {
        match &self.accessory {
            Some((info, handle)) if self.handle.started() => (info, handle),
            _ => (&self.info, &self.handle),
        }
    }
}

impl UsbBackend for MockBackend {
    fn devices(&self) -> Result<Vec<UsbDeviceInfo>, UsbError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.current().0.clone())
            .collect())
    }

    fn open(&self, device: &UsbDeviceInfo) -> Result<Box<dyn UsbHandle>, UsbError> {
        let mut devices = self.devices.lock().unwrap();

        let entry = devices
            .iter_mut()
            .find(|d| d.current().0.location == device.location)
            .ok_or_else(|| UsbError::NotFound(device.location.to_string()))?;

        if entry.open_failures > 0 {
            entry.open_failures -= 1;
            return Err(UsbError::Busy);
        }

        Ok(Box::new(entry.current().1.clone()))
    }
}
