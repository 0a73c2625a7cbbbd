//! Windows backend: UI Automation tree access, synthetic input, process
//! control and registry lookup for the target application.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task;
use tracing::debug;
use uiautomation::controls::ControlType;
use uiautomation::filters::ControlTypeFilter;
use uiautomation::inputs::Mouse;
use uiautomation::patterns;
use uiautomation::types::Point;
use uiautomation::UIAutomation;

use crate::element::{OperationSignature, UiElement, UiElementImpl};
use crate::errors::AutomationError;
use crate::platforms::AutomationBackend;
use crate::types::{Credential, ScreenshotResult};

impl From<uiautomation::Error> for AutomationError {
    fn from(error: uiautomation::Error) -> Self {
        AutomationError::PlatformError(format!("UIAutomation error: {error}"))
    }
}

/// Thread-safe wrapper for the UIAutomation COM object
#[derive(Clone)]
struct ThreadSafeAutomation(Arc<UIAutomation>);

// Safety: IUIAutomation is thread-safe once COM is initialized multithreaded
unsafe impl Send for ThreadSafeAutomation {}
unsafe impl Sync for ThreadSafeAutomation {}

/// Thread-safe wrapper for a UIA element
#[derive(Clone)]
struct ThreadSafeElement(Arc<uiautomation::UIElement>);

unsafe impl Send for ThreadSafeElement {}
unsafe impl Sync for ThreadSafeElement {}

pub struct WindowsBackend {
    automation: ThreadSafeAutomation,
}

impl WindowsBackend {
    pub fn new() -> Result<Self, AutomationError> {
        use windows::Win32::System::Com::{CoInitializeEx, COINIT_MULTITHREADED};
        unsafe {
            let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
            // 0x80010106 = RPC_E_CHANGED_MODE, the apartment is already set up
            if hr.is_err() && hr != windows::core::HRESULT(0x80010106u32 as i32) {
                return Err(AutomationError::PlatformError(format!(
                    "Failed to initialize COM: {hr}"
                )));
            }
        }
        let automation = UIAutomation::new_direct()
            .map_err(|e| AutomationError::PlatformError(e.to_string()))?;
        Ok(Self {
            automation: ThreadSafeAutomation(Arc::new(automation)),
        })
    }

    fn find_window_element(
        &self,
        title: &str,
        timeout_ms: u64,
    ) -> Result<Option<uiautomation::UIElement>, AutomationError> {
        let automation = &self.automation.0;
        let root = automation.get_root_element()?;
        let matcher = automation
            .create_matcher()
            .from(root)
            .timeout(timeout_ms)
            .depth(3)
            .filter(Box::new(ControlTypeFilter {
                control_type: ControlType::Window,
            }))
            .contains_name(title);
        match matcher.find_first() {
            Ok(el) => Ok(Some(el)),
            Err(_) => Ok(None),
        }
    }

    fn focused(&self) -> Result<uiautomation::UIElement, AutomationError> {
        Ok(self.automation.0.get_focused_element()?)
    }
}

#[async_trait::async_trait]
impl AutomationBackend for WindowsBackend {
    fn screen_size(&self) -> Result<(u32, u32), AutomationError> {
        use windows::Win32::UI::WindowsAndMessaging::{
            GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
        };
        let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if w <= 0 || h <= 0 {
            return Err(AutomationError::PlatformError(
                "GetSystemMetrics returned non-positive screen size".to_string(),
            ));
        }
        Ok((w as u32, h as u32))
    }

    fn scale_factor(&self) -> Result<f64, AutomationError> {
        use windows::Win32::UI::HiDpi::GetDpiForSystem;
        let dpi = unsafe { GetDpiForSystem() };
        Ok(dpi as f64 / 96.0)
    }

    async fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        task::spawn_blocking(|| {
            let monitors = xcap::Monitor::all().map_err(|e| {
                AutomationError::PlatformError(format!("Failed to list monitors: {e}"))
            })?;
            let monitor = monitors
                .into_iter()
                .find(|m| m.is_primary().unwrap_or(false))
                .ok_or_else(|| {
                    AutomationError::PlatformError("No primary monitor found".to_string())
                })?;
            let image = monitor.capture_image().map_err(|e| {
                AutomationError::PlatformError(format!("Failed to capture screen: {e}"))
            })?;
            Ok(ScreenshotResult {
                width: image.width(),
                height: image.height(),
                image_data: image.into_raw(),
            })
        })
        .await
        .map_err(|e| AutomationError::PlatformError(format!("Task join error: {e}")))?
    }

    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        let mouse = Mouse::default();
        mouse.click(Point::new(x, y))?;
        Ok(())
    }

    fn replace_text(&self, text: &str, compat: bool) -> Result<(), AutomationError> {
        let focused = self.focused()?;
        focused.send_keys("{ctrl}a", 10)?;
        focused.send_keys("{delete}", 10)?;
        if compat {
            // Clipboard paste avoids IME popups covering the field
            focused.send_text_by_clipboard(text)?;
        } else {
            focused.send_text(text, 10)?;
        }
        Ok(())
    }

    fn press_enter(&self) -> Result<(), AutomationError> {
        let focused = self.focused()?;
        focused.send_keys("{enter}", 10)?;
        Ok(())
    }

    fn window_root(&self, pid: Option<u32>, title: &str) -> Result<UiElement, AutomationError> {
        let window = self
            .find_window_element(title, 3_000)?
            .ok_or_else(|| AutomationError::ElementNotFound(format!("window '{title}'")))?;
        if let Some(expected) = pid {
            let actual = window.get_process_id()? as u32;
            if actual != expected {
                return Err(AutomationError::ElementNotFound(format!(
                    "window '{title}' belongs to pid {actual}, expected {expected}"
                )));
            }
        }
        Ok(UiElement::new(Box::new(WindowsElement {
            element: ThreadSafeElement(Arc::new(window)),
            automation: self.automation.clone(),
        })))
    }

    fn window_exists(&self, title: &str) -> Result<bool, AutomationError> {
        Ok(self.find_window_element(title, 500)?.is_some())
    }

    fn activate_window(&self, title: &str) -> Result<(), AutomationError> {
        let window = self
            .find_window_element(title, 3_000)?
            .ok_or_else(|| AutomationError::ElementNotFound(format!("window '{title}'")))?;
        window.set_focus()?;
        Ok(())
    }

    fn find_process(&self, needle: &str, exclude: &[u32]) -> Result<Option<u32>, AutomationError> {
        let needle = needle.to_lowercase();
        let sys = sysinfo::System::new_all();
        for (pid, process) in sys.processes() {
            let name = process.name().to_string_lossy().to_lowercase();
            let pid = pid.as_u32();
            // Skip helper children of the target (browser/host subprocesses)
            if name.contains(&needle)
                && !name.contains("browser")
                && !name.contains("host")
                && !exclude.contains(&pid)
            {
                return Ok(Some(pid));
            }
        }
        Ok(None)
    }

    fn kill_process(&self, name: &str) -> Result<(), AutomationError> {
        let target = name.to_lowercase();
        let sys = sysinfo::System::new_all();
        for process in sys.processes().values() {
            if process.name().to_string_lossy().to_lowercase() == target {
                process.kill();
            }
        }
        Ok(())
    }

    fn launch(&self, path: &Path, args: &[String]) -> Result<(), AutomationError> {
        std::process::Command::new(path)
            .args(args)
            .spawn()
            .map_err(|e| {
                AutomationError::PlatformError(format!(
                    "failed to launch {}: {e}",
                    path.display()
                ))
            })?;
        Ok(())
    }

    fn install_path_from_registry(&self) -> Result<Option<PathBuf>, AutomationError> {
        use windows::core::w;
        use windows::Win32::System::Registry::{
            RegGetValueW, HKEY_LOCAL_MACHINE, RRF_RT_REG_SZ,
        };

        let mut buf = [0u16; 1024];
        let mut size = (buf.len() * 2) as u32;
        let status = unsafe {
            RegGetValueW(
                HKEY_LOCAL_MACHINE,
                w!("SOFTWARE\\WOW6432Node\\Seewo\\EasiNote5"),
                w!("ExePath"),
                RRF_RT_REG_SZ,
                None,
                Some(buf.as_mut_ptr() as *mut _),
                Some(&mut size),
            )
        };
        if status.is_err() {
            debug!("registry lookup for install path failed: {status:?}");
            return Ok(None);
        }
        let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        Ok(Some(PathBuf::from(String::from_utf16_lossy(&buf[..len]))))
    }
}

/// A UIA element adapted to the engine's element seam.
struct WindowsElement {
    element: ThreadSafeElement,
    automation: ThreadSafeAutomation,
}

impl std::fmt::Debug for WindowsElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsElement")
            .field("automation_id", &self.automation_id())
            .finish()
    }
}

impl WindowsElement {
    fn wrap(&self, element: uiautomation::UIElement) -> UiElement {
        UiElement::new(Box::new(WindowsElement {
            element: ThreadSafeElement(Arc::new(element)),
            automation: self.automation.clone(),
        }))
    }

    fn raw_children(&self) -> Result<Vec<uiautomation::UIElement>, AutomationError> {
        let walker = self.automation.0.create_tree_walker()?;
        let mut out = Vec::new();
        let mut next = walker.get_first_child(&self.element.0);
        while let Ok(child) = next {
            next = walker.get_next_sibling(&child);
            out.push(child);
        }
        Ok(out)
    }

    fn control_type(&self) -> Result<ControlType, AutomationError> {
        Ok(self.element.0.get_control_type()?)
    }

    /// Structural scan of the subtree for the credential slots the login
    /// cluster must expose: an account edit, a password edit and a submit
    /// button. Returns them without relying on any concrete class name.
    fn login_slots(&self) -> Result<Option<LoginSlots>, AutomationError> {
        let mut account: Option<uiautomation::UIElement> = None;
        let mut password: Option<uiautomation::UIElement> = None;
        let mut submit: Option<uiautomation::UIElement> = None;
        let mut consent: Option<uiautomation::UIElement> = None;

        let mut stack = self.raw_children()?;
        while let Some(el) = stack.pop() {
            let ct = el.get_control_type()?;
            let id = el.get_automation_id().unwrap_or_default().to_lowercase();
            match ct {
                ControlType::Edit => {
                    if el.is_password().unwrap_or(false) || id.contains("password") {
                        password.get_or_insert(el);
                    } else {
                        account.get_or_insert(el);
                    }
                }
                ControlType::Button => {
                    if id.contains("login") || submit.is_none() {
                        submit = Some(el);
                    }
                }
                ControlType::CheckBox => {
                    consent.get_or_insert(el);
                }
                _ => {
                    let walker = self.automation.0.create_tree_walker()?;
                    let mut next = walker.get_first_child(&el);
                    while let Ok(child) = next {
                        next = walker.get_next_sibling(&child);
                        stack.push(child);
                    }
                }
            }
        }

        match (account, password, submit) {
            (Some(account), Some(password), Some(submit)) => Ok(Some(LoginSlots {
                account,
                password,
                submit,
                consent,
            })),
            _ => Ok(None),
        }
    }
}

struct LoginSlots {
    account: uiautomation::UIElement,
    password: uiautomation::UIElement,
    submit: uiautomation::UIElement,
    consent: Option<uiautomation::UIElement>,
}

fn set_edit_value(el: &uiautomation::UIElement, text: &str) -> Result<(), AutomationError> {
    let pattern = el.get_pattern::<patterns::UIValuePattern>()?;
    pattern.set_value(text)?;
    Ok(())
}

impl UiElementImpl for WindowsElement {
    fn role(&self) -> String {
        self.control_type()
            .map(|ct| format!("{ct:?}").to_lowercase())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn automation_id(&self) -> Option<String> {
        self.element
            .0
            .get_automation_id()
            .ok()
            .filter(|s| !s.is_empty())
    }

    fn name(&self) -> Option<String> {
        self.element.0.get_name().ok().filter(|s| !s.is_empty())
    }

    fn bounds(&self) -> Result<(f64, f64, f64, f64), AutomationError> {
        let rect = self.element.0.get_bounding_rectangle()?;
        Ok((
            rect.get_left() as f64,
            rect.get_top() as f64,
            rect.get_width() as f64,
            rect.get_height() as f64,
        ))
    }

    fn children(&self) -> Result<Vec<UiElement>, AutomationError> {
        Ok(self
            .raw_children()?
            .into_iter()
            .map(|el| self.wrap(el))
            .collect())
    }

    fn operations(&self) -> Vec<OperationSignature> {
        // UIA exposes patterns, not method signatures. A container that
        // structurally holds account + password + submit slots is reported
        // as exposing the three-parameter login operation, named after its
        // automation id so renamed controls still match on the "login"
        // substring.
        let Ok(ct) = self.control_type() else {
            return Vec::new();
        };
        if !matches!(ct, ControlType::Custom | ControlType::Pane | ControlType::Group) {
            return Vec::new();
        }
        let label = self
            .automation_id()
            .or_else(|| self.name())
            .unwrap_or_default();
        if !label.to_lowercase().contains("login") {
            return Vec::new();
        }
        match self.login_slots() {
            Ok(Some(_)) => vec![OperationSignature::new(label, crate::capability::LOGIN_ARITY)],
            _ => Vec::new(),
        }
    }

    fn invoke_login(
        &self,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<(), AutomationError> {
        if context.is_some() {
            // A non-default context selects application-internal behavior
            // that is not the login path.
            return Err(AutomationError::UnsupportedOperation(
                "non-default login context is out of scope".to_string(),
            ));
        }
        let slots = self.login_slots()?.ok_or_else(|| {
            AutomationError::InvocationRejected(
                "login cluster lost its credential slots since the probe".to_string(),
            )
        })?;

        set_edit_value(&slots.account, &credential.account)?;
        set_edit_value(&slots.password, credential.secret())?;

        if let Some(consent) = &slots.consent {
            let toggle = consent.get_pattern::<patterns::UITogglePattern>()?;
            if toggle.get_toggle_state()? != uiautomation::types::ToggleState::On {
                toggle.toggle()?;
            }
        }

        let invoke = slots.submit.get_pattern::<patterns::UIInvokePattern>()?;
        invoke.invoke().map_err(|e| {
            AutomationError::InvocationRejected(format!("login button refused invoke: {e}"))
        })?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn UiElementImpl> {
        Box::new(WindowsElement {
            element: self.element.clone(),
            automation: self.automation.clone(),
        })
    }
}
