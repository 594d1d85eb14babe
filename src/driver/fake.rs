//! In-memory page implementing [`Driver`], for exercising the pipeline
//! without a browser.
//!
//! Elements answer natively to `Id`, `ClassName`, `Name` and `TagName`
//! lookups; `Css`/`XPath` lookups only match selectors registered on the
//! element with [`FakeElement::answers`]. Element handles are indices, and a
//! handle to an element that is no longer rendered reports as stale.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Driver, DriverError, Launcher, SelectOption, Target, Using};

/// Where an element is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Always present while the form is shown.
    Form,
    /// Present only while the given calendar period is shown.
    Period(usize),
    /// Present only after the form has been submitted.
    Result,
}

/// Side effect of activating an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickEffect {
    NextPeriod,
    Submit,
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub classes: Vec<String>,
    pub text: String,
    pub value: String,
    pub selected: bool,
    pub displayed: bool,
    pub obstructed: bool,
    pub rejects_typing: bool,
    pub inert: bool,
    pub options: Vec<SelectOption>,
    pub chosen: Option<SelectOption>,
    pub aliases: Vec<(Using, String)>,
    pub effect: Option<ClickEffect>,
    pub scope: Scope,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            id: None,
            name: None,
            classes: Vec::new(),
            text: String::new(),
            value: String::new(),
            selected: false,
            displayed: true,
            obstructed: false,
            rejects_typing: false,
            inert: false,
            options: Vec::new(),
            chosen: None,
            aliases: Vec::new(),
            effect: None,
            scope: Scope::Form,
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.classes.extend(class.split_whitespace().map(str::to_string));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn obstructed(mut self) -> Self {
        self.obstructed = true;
        self
    }

    pub fn rejects_typing(mut self) -> Self {
        self.rejects_typing = true;
        self
    }

    /// Refuses every interaction, including the script fallbacks.
    pub fn inert(mut self) -> Self {
        self.inert = true;
        self
    }

    /// Turn the element into a drop-down with `(label, value)` options.
    pub fn options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(label, value)| SelectOption {
                label: label.to_string(),
                value: value.to_string(),
            })
            .collect();
        self
    }

    /// Register a Css/XPath selector this element matches.
    pub fn answers(mut self, using: Using, selector: &str) -> Self {
        self.aliases.push((using, selector.to_string()));
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    fn matches(&self, using: Using, selector: &str) -> bool {
        if self.aliases.iter().any(|(u, s)| *u == using && s == selector) {
            return true;
        }
        match using {
            Using::Id => self.id.as_deref() == Some(selector),
            Using::ClassName => self.classes.iter().any(|c| c == selector),
            Using::Name => self.name.as_deref() == Some(selector),
            Using::TagName => self.tag == selector,
            Using::Css | Using::XPath => false,
        }
    }

    fn describe(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .or_else(|| (!self.text.is_empty()).then(|| self.text.clone()))
            .unwrap_or_else(|| self.tag.clone())
    }
}

/// Interaction recorded by the fake, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Navigated(String),
    Typed { element: String, text: String },
    Assigned { element: String, text: String },
    Clicked(String),
    ForceClicked(String),
    Chose { element: String, label: String },
    Scrolled(String),
}

/// What the page shows once submitted.
#[derive(Debug, Clone, Default)]
pub struct ResultSurface {
    pub content: String,
    pub address: String,
}

#[derive(Debug, Default)]
struct PageState {
    elements: Vec<FakeElement>,
    period: usize,
    submitted: bool,
    address: String,
    content: String,
    result: ResultSurface,
    actions: Vec<Action>,
    launches: usize,
    quits: usize,
    snapshot_fails: bool,
}

impl PageState {
    fn live(&self, el: &FakeElement) -> bool {
        match el.scope {
            Scope::Form => !self.submitted,
            Scope::Period(p) => !self.submitted && p == self.period,
            Scope::Result => self.submitted,
        }
    }

    fn element(&self, target: &Target) -> Result<(usize, &FakeElement), DriverError> {
        let idx: usize = target
            .id()
            .parse()
            .map_err(|_| DriverError::NoSuchElement)?;
        let el = self.elements.get(idx).ok_or(DriverError::NoSuchElement)?;
        if !self.live(el) {
            return Err(DriverError::StaleElement(el.describe()));
        }
        Ok((idx, el))
    }

    fn matching(&self, using: Using, selector: &str) -> Vec<Target> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, el)| self.live(el) && el.matches(using, selector))
            .map(|(i, _)| Target::new(i.to_string()))
            .collect()
    }

    fn perform_click(&mut self, idx: usize) {
        let el = &mut self.elements[idx];
        if el.tag == "input" {
            el.selected = !el.selected;
        }
        match el.effect {
            Some(ClickEffect::NextPeriod) => self.period += 1,
            Some(ClickEffect::Submit) => {
                self.submitted = true;
                self.address = self.result.address.clone();
                self.content = self.result.content.clone();
            }
            None => {}
        }
    }
}

/// Scriptable page shared between the test and the pipeline under test.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, element: FakeElement) -> Self {
        self.lock().elements.push(element);
        self
    }

    pub fn with_result(self, content: &str, address: &str) -> Self {
        self.lock().result = ResultSurface {
            content: content.to_string(),
            address: address.to_string(),
        };
        self
    }

    pub fn failing_snapshots(self) -> Self {
        self.lock().snapshot_fails = true;
        self
    }

    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    pub fn launches(&self) -> usize {
        self.lock().launches
    }

    pub fn quits(&self) -> usize {
        self.lock().quits
    }

    pub fn period(&self) -> usize {
        self.lock().period
    }

    /// Current state of the first element with the given id.
    pub fn element_by_id(&self, id: &str) -> Option<FakeElement> {
        self.lock()
            .elements
            .iter()
            .find(|el| el.id.as_deref() == Some(id))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        // A panicking test thread must not hide the page from later asserts.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait::async_trait]
impl Launcher for FakePage {
    async fn launch(&self) -> Result<Box<dyn Driver>, DriverError> {
        let mut state = self.lock();
        state.launches += 1;
        state.submitted = false;
        state.period = 0;
        state.content.clear();
        drop(state);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait::async_trait]
impl Driver for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.address = url.to_string();
        state.actions.push(Action::Navigated(url.to_string()));
        Ok(())
    }

    async fn wait_until_ready(&self, _timeout: Duration) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn find(
        &self,
        using: Using,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Target>, DriverError> {
        let hit = self.lock().matching(using, selector).into_iter().next();
        if hit.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(hit)
    }

    async fn find_all(&self, using: Using, selector: &str) -> Result<Vec<Target>, DriverError> {
        Ok(self.lock().matching(using, selector))
    }

    async fn clear(&self, target: &Target) -> Result<(), DriverError> {
        let mut state = self.lock();
        let (idx, el) = state.element(target)?;
        if el.rejects_typing || el.inert {
            return Err(DriverError::NotInteractable(el.describe()));
        }
        state.elements[idx].value.clear();
        Ok(())
    }

    async fn type_text(&self, target: &Target, text: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        let (idx, el) = state.element(target)?;
        if el.rejects_typing || el.inert {
            return Err(DriverError::NotInteractable(el.describe()));
        }
        let element = el.describe();
        state.elements[idx].value.push_str(text);
        state.actions.push(Action::Typed {
            element,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn assign_value(&self, target: &Target, text: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        let (idx, el) = state.element(target)?;
        if el.inert {
            return Err(DriverError::NotInteractable(el.describe()));
        }
        let element = el.describe();
        state.elements[idx].value = text.to_string();
        state.actions.push(Action::Assigned {
            element,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn wait_actionable(
        &self,
        target: &Target,
        _timeout: Duration,
    ) -> Result<bool, DriverError> {
        let state = self.lock();
        let (_, el) = state.element(target)?;
        Ok(el.displayed)
    }

    async fn click(&self, target: &Target) -> Result<(), DriverError> {
        let mut state = self.lock();
        let (idx, el) = state.element(target)?;
        if el.obstructed || el.inert || !el.displayed {
            return Err(DriverError::NotInteractable(el.describe()));
        }
        let element = el.describe();
        state.actions.push(Action::Clicked(element));
        state.perform_click(idx);
        Ok(())
    }

    async fn force_click(&self, target: &Target) -> Result<(), DriverError> {
        let mut state = self.lock();
        let (idx, el) = state.element(target)?;
        if el.inert {
            return Err(DriverError::NotInteractable(el.describe()));
        }
        let element = el.describe();
        state.actions.push(Action::ForceClicked(element));
        state.perform_click(idx);
        Ok(())
    }

    async fn scroll_into_view(&self, target: &Target) -> Result<(), DriverError> {
        let mut state = self.lock();
        let element = state.element(target)?.1.describe();
        state.actions.push(Action::Scrolled(element));
        Ok(())
    }

    async fn text(&self, target: &Target) -> Result<String, DriverError> {
        Ok(self.lock().element(target)?.1.text.clone())
    }

    async fn attribute(&self, target: &Target, name: &str) -> Result<Option<String>, DriverError> {
        let state = self.lock();
        let el = state.element(target)?.1;
        Ok(match name {
            "class" => Some(el.classes.join(" ")),
            "id" => el.id.clone(),
            "name" => el.name.clone(),
            "value" => Some(el.value.clone()),
            _ => None,
        })
    }

    async fn is_selected(&self, target: &Target) -> Result<bool, DriverError> {
        Ok(self.lock().element(target)?.1.selected)
    }

    async fn is_displayed(&self, target: &Target) -> Result<bool, DriverError> {
        Ok(self.lock().element(target)?.1.displayed)
    }

    async fn options(&self, select: &Target) -> Result<Vec<SelectOption>, DriverError> {
        Ok(self.lock().element(select)?.1.options.clone())
    }

    async fn choose_option(
        &self,
        select: &Target,
        option: &SelectOption,
    ) -> Result<(), DriverError> {
        let mut state = self.lock();
        let (idx, el) = state.element(select)?;
        if !el.options.contains(option) {
            return Err(DriverError::NoSuchElement);
        }
        let element = el.describe();
        state.elements[idx].chosen = Some(option.clone());
        state.actions.push(Action::Chose {
            element,
            label: option.label.clone(),
        });
        Ok(())
    }

    async fn visible_content(&self) -> Result<String, DriverError> {
        Ok(self.lock().content.clone())
    }

    async fn current_address(&self) -> Result<String, DriverError> {
        Ok(self.lock().address.clone())
    }

    async fn snapshot(&self) -> Result<Vec<u8>, DriverError> {
        if self.lock().snapshot_fails {
            return Err(DriverError::Protocol {
                code: "unknown error".into(),
                message: "screenshot unavailable".into(),
            });
        }
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.lock().quits += 1;
        Ok(())
    }
}
