use aura_device_pairing::domain::models::PairingNotification;
use aura_device_pairing::domain::settings::SettingsService;
use aura_device_pairing::infrastructure::bluetooth::connection::{CharacteristicPath, WriteType};
use aura_device_pairing::infrastructure::bluetooth::operation::{CompletionSink, GattOperation};
use aura_device_pairing::infrastructure::bluetooth::protocol;
use aura_device_pairing::infrastructure::bluetooth::simulated::{
    SimulatedDiscovery, SimulatedPeripheral,
};
use aura_device_pairing::infrastructure::bluetooth::BluetoothService;
use aura_device_pairing::infrastructure::logging;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting Aura device pairing");

    let settings = Arc::new(Mutex::new(settings_service));
    let (service, mut failures) = BluetoothService::new(settings)?;
    let service = Arc::new(service);

    let (_subscription, mut notifications) =
        service.pairing().notifications().subscribe_channel();
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match notification {
                PairingNotification::Connected { name, address } => {
                    info!("Paired with {} ({})", name, address)
                }
                PairingNotification::Disconnected => info!("Pairing ended"),
            }
        }
    });
    tokio::spawn(async move {
        while let Some(failure) = failures.recv().await {
            error!(
                "{} #{} failed: {}",
                failure.operation, failure.id, failure.error
            );
        }
    });

    let battery = CharacteristicPath::new(protocol::BATTERY_SERVICE, protocol::BATTERY_LEVEL);
    let firmware = CharacteristicPath::new(
        protocol::DEVICE_INFORMATION_SERVICE,
        protocol::FIRMWARE_REVISION,
    );
    let manufacturer = CharacteristicPath::new(
        protocol::DEVICE_INFORMATION_SERVICE,
        protocol::MANUFACTURER_NAME,
    );
    let heart_rate = CharacteristicPath::new(
        protocol::HEART_RATE_SERVICE,
        protocol::HEART_RATE_MEASUREMENT,
    );

    let (peripheral, mut radio_events) = SimulatedPeripheral::new("C0:FF:EE:00:00:01".parse()?);
    peripheral.add_characteristic(battery, vec![87]);
    peripheral.add_characteristic(firmware, b"1.4.2".to_vec());
    peripheral.add_characteristic(manufacturer, b"Aura Labs".to_vec());
    peripheral.add_characteristic(heart_rate, vec![0x00, 72]);
    let peripheral = Arc::new(peripheral);

    // Radio callbacks arrive on their own task
    let callback_service = service.clone();
    let radio = tokio::spawn(async move {
        while let Some(event) = radio_events.recv().await {
            callback_service.handle_transport_event(event);
        }
    });

    let mut discovery = SimulatedDiscovery::new();
    discovery.advertise("Aura-Band", -55, peripheral.clone());
    let device = service.automatic_pairing(&discovery)?;

    let (battery_sink, battery_level) = CompletionSink::oneshot();
    let (firmware_sink, firmware_revision) = CompletionSink::oneshot();
    let (manufacturer_sink, manufacturer_name) = CompletionSink::oneshot();
    service.enqueue(GattOperation::read_characteristic(
        device.address,
        battery,
        battery_sink,
    ))?;
    service.enqueue(GattOperation::read_characteristic(
        device.address,
        firmware,
        firmware_sink,
    ))?;
    service.enqueue(GattOperation::read_characteristic(
        device.address,
        manufacturer,
        manufacturer_sink,
    ))?;
    service.enqueue(GattOperation::enable_notifications(
        device.address,
        heart_rate,
    ))?;
    service.enqueue(GattOperation::write_characteristic(
        device.address,
        heart_rate,
        [0x01],
        WriteType::WithoutResponse,
    ))?;

    let level = tokio::time::timeout(READ_TIMEOUT, battery_level).await??;
    let revision = tokio::time::timeout(READ_TIMEOUT, firmware_revision).await??;
    let maker = tokio::time::timeout(READ_TIMEOUT, manufacturer_name).await??;
    info!(
        "{} sensor, battery {}%, firmware {}",
        String::from_utf8_lossy(&maker),
        level.first().copied().unwrap_or_default(),
        String::from_utf8_lossy(&revision)
    );

    service.enqueue(GattOperation::disable_notifications(
        device.address,
        heart_rate,
    ))?;

    service.disconnect();
    radio.abort();

    info!("Done");
    Ok(())
}
