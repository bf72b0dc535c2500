#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Input, Pull};
use embassy_stm32::time::Hertz;
use embassy_stm32::usb::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_usb::Builder;
use heapless::Vec;
use panic_halt as _;

use emberboot::boot::{self, BootPath};
use emberboot::handoff;
use emberboot::nor_device::NorDevice;
use emberboot::programmer::FlashProgrammer;
use emberboot::{BootConfig, BootSignal, Reboot};
use emberboot_firmware::session::UpdateSession;
use emberboot_firmware::usb_io::io_loop;
use emberboot_firmware::usb_vendor::UpdatePort;

bind_interrupts!(struct Irqs {
    USB_LP_CAN1_RX0 => usb::InterruptHandler<peripherals::USB>;
});

/// Memory-mapped base of on-chip flash.
const FLASH_BASE: u32 = 0x0800_0000;

/// 8 KiB bootloader at the front of flash, 1 KiB erase pages on the
/// stm32f103c8, the remaining 56 KiB for the application image.
const CONFIG: BootConfig = BootConfig::new(0x2000, 0xE000, 0x400);

/// Transfer chunk size; every host write consumes this much flash.
const TRANSFER_SIZE: usize = 256;

/// BOOT button on PB2, active low with the internal pull-up.
struct BootPin<'d> {
    pin: Input<'d>,
}

impl BootSignal for BootPin<'_> {
    fn force_update(&mut self) -> bool {
        self.pin.is_low()
    }
}

struct SystemReset;

impl Reboot for SystemReset {
    fn reboot(&mut self) -> ! {
        cortex_m::peripheral::SCB::sys_reset()
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    // 8 MHz HSE * 9 = 72 MHz sysclk, USB at 48 MHz. Set up front because
    // the HAL initializes the clock tree exactly once.
    let mut hal_config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::*;
        hal_config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        hal_config.rcc.pll = Some(Pll {
            src: PllSource::HSE,
            prediv: PllPreDiv::DIV1,
            mul: PllMul::MUL9,
        });
        hal_config.rcc.sys = Sysclk::PLL1_P;
        hal_config.rcc.ahb_pre = AHBPrescaler::DIV1;
        hal_config.rcc.apb1_pre = APBPrescaler::DIV2;
        hal_config.rcc.apb2_pre = APBPrescaler::DIV1;
    }
    let p = embassy_stm32::init(hal_config);

    let flash = Flash::new_blocking(p.FLASH);
    let mut device = NorDevice::new(flash.into_blocking_regions().bank1_region);

    let mut boot_pin = BootPin {
        pin: Input::new(p.PB2, Pull::Up),
    };

    if let Ok(BootPath::RunApplication) = boot::evaluate(&CONFIG, &mut boot_pin, &mut device) {
        // SAFETY: single shot, before anything else runs; the header was
        // blank-checked by the boot decision. Never returns and the
        // application owns the vector table from here on.
        unsafe { handoff::start_application(FLASH_BASE + CONFIG.app_base) };
    }

    // Update mode: stay resident and serve the session until the host
    // detaches, which resets the system.
    let driver = Driver::new(p.USB, Irqs, p.PA12, p.PA11);

    let mut usb_config = embassy_usb::Config::new(0xc0de, 0xcafe);
    usb_config.manufacturer = Some("emberboot");
    usb_config.product = Some("emberboot update");
    usb_config.serial_number = Some("0001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;
    usb_config.device_class = 0xFF;
    usb_config.device_sub_class = 0x00;
    usb_config.device_protocol = 0x00;
    usb_config.composite_with_iads = false;

    let mut config_descriptor = [0; 256];
    let mut bos_descriptor = [0; 256];
    let mut control_buf = [0; 64];

    let mut builder = Builder::new(
        driver,
        usb_config,
        &mut config_descriptor,
        &mut bos_descriptor,
        &mut [], // no msos descriptors
        &mut control_buf,
    );

    let port = UpdatePort::new(&mut builder, 64);
    let (mut sender, mut receiver) = port.split();

    let mut usb = builder.build();
    let usb_fut = usb.run();

    let mut session: UpdateSession<TRANSFER_SIZE, _, _> =
        UpdateSession::new(FlashProgrammer::new(device, CONFIG), SystemReset);

    let session_fut = async {
        let mut usb_buf = [0u8; 512];
        let mut frame: Vec<u8, 512> = Vec::new();
        let mut out_buf = [0u8; 64];
        loop {
            receiver.wait_connection().await;
            frame.clear();
            let _ = io_loop(
                &mut receiver,
                &mut sender,
                &mut session,
                &mut usb_buf,
                &mut frame,
                &mut out_buf,
            )
            .await;
        }
    };

    join(usb_fut, session_fut).await;
}
