/*
    Copyright 2025 TII (SSRC) and the contributors
    SPDX-License-Identifier: Apache-2.0
*/
mod toast;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use log::debug;
use relm4::gtk::prelude::*;
use relm4::prelude::*;
use relm4::{adw, gtk};

use expressvpn_gui::cli;
use expressvpn_gui::engine::Engine;
use expressvpn_gui::events::EventPump;
use expressvpn_gui::model::{ConnectionPhase, NetworkLock, Preference};
use expressvpn_gui::view::ViewState;

use toast::Notifier;

const PUMP_INTERVAL: Duration = Duration::from_millis(100);

struct App {
    engine: Rc<Engine>,
    pump: EventPump,
    view: ViewState,
    notifier: Notifier,
    protocols: gtk::StringList,
    locations: gtk::StringList,
    /// Location picked in the selector, if it differs from the preselected one.
    chosen_location: Option<String>,
    activation_code: gtk::EntryBuffer,
    /// Set while list contents are replaced, so the selection changes that
    /// causes are not taken for user input.
    syncing: Rc<Cell<bool>>,
}

#[derive(Debug)]
enum AppMsg {
    Pump,
    SelectProtocol(u32),
    SelectNetworkLock(u32),
    SelectLocation(u32),
    ToggleConnection,
    Activate,
}

impl App {
    fn sync_list(&self, list: &gtk::StringList, items: &[&str]) {
        let current: Vec<String> = (0..list.n_items())
            .filter_map(|i| list.string(i).map(|s| s.to_string()))
            .collect();
        if current.iter().map(String::as_str).ne(items.iter().copied()) {
            self.syncing.set(true);
            list.splice(0, list.n_items(), items);
            self.syncing.set(false);
        }
    }

    fn sync_lists(&self) {
        let protocols: Vec<&str> = self.view.protocols().iter().map(String::as_str).collect();
        self.sync_list(&self.protocols, &protocols);

        let locations: Vec<&str> = self
            .view
            .locations()
            .iter()
            .map(|l| l.display_name.as_str())
            .collect();
        self.sync_list(&self.locations, &locations);
    }

    fn location(&self) -> Option<&str> {
        self.chosen_location
            .as_deref()
            .or_else(|| self.view.selected_location())
    }

    fn location_index(&self) -> u32 {
        self.location()
            .and_then(|name| {
                self.view
                    .locations()
                    .iter()
                    .position(|l| l.display_name == name)
            })
            .map_or(gtk::INVALID_LIST_POSITION, |i| i as u32)
    }

    fn protocol_index(&self) -> u32 {
        self.view
            .protocol()
            .and_then(|p| self.view.protocols().iter().position(|known| known == p))
            .map_or(gtk::INVALID_LIST_POSITION, |i| i as u32)
    }

    fn network_lock_index(&self) -> u32 {
        NetworkLock::ALL
            .iter()
            .position(|l| *l == self.view.network_lock())
            .unwrap_or_default() as u32
    }

    fn change_preference(&self, preference: Preference, sender: &ComponentSender<Self>) {
        let coordinator = self.engine.coordinator();
        sender.oneshot_command(async move {
            if let Err(err) = coordinator.change_preference(preference).await {
                debug!("Preference not changed: {err}");
            }
        });
    }
}

#[relm4::component]
impl SimpleComponent for App {
    type Init = ();
    type Input = AppMsg;
    type Output = ();

    view! {
        gtk::Window {
            set_title: Some("ExpressVPN"),
            set_default_size: (360, 320),

            #[local_ref]
            toast_overlay -> adw::ToastOverlay {
                #[wrap(Some)]
                set_child = &gtk::Box {
                    set_orientation: gtk::Orientation::Vertical,
                    set_spacing: 8,
                    set_margin_all: 16,

                    gtk::Label {
                        set_label: "Protocol and network lock:",
                        set_halign: gtk::Align::Start,
                    },

                    gtk::Box {
                        set_spacing: 8,
                        set_homogeneous: true,

                        gtk::DropDown {
                            set_model: Some(&model.protocols),
                            #[watch]
                            set_sensitive: model.view.selectors_enabled(),
                            #[watch]
                            set_selected: model.protocol_index(),
                            connect_selected_notify[sender, syncing = Rc::clone(&model.syncing)] => move |dropdown| {
                                if !syncing.get() {
                                    sender.input(AppMsg::SelectProtocol(dropdown.selected()));
                                }
                            },
                        },

                        gtk::DropDown::from_strings(&NetworkLock::ALL.map(NetworkLock::as_str)) {
                            #[watch]
                            set_sensitive: model.view.selectors_enabled(),
                            #[watch]
                            set_selected: model.network_lock_index(),
                            connect_selected_notify[sender] => move |dropdown| {
                                sender.input(AppMsg::SelectNetworkLock(dropdown.selected()));
                            },
                        },
                    },

                    gtk::Label {
                        set_label: "Select location:",
                        set_halign: gtk::Align::Start,
                    },

                    gtk::DropDown {
                        set_model: Some(&model.locations),
                        set_enable_search: true,
                        #[watch]
                        set_sensitive: model.view.selectors_enabled(),
                        #[watch]
                        set_selected: model.location_index(),
                        connect_selected_notify[sender, syncing = Rc::clone(&model.syncing)] => move |dropdown| {
                            if !syncing.get() {
                                sender.input(AppMsg::SelectLocation(dropdown.selected()));
                            }
                        },
                    },

                    gtk::Button {
                        add_css_class: "suggested-action",
                        #[watch]
                        set_label: model.view.button_label(),
                        #[watch]
                        set_sensitive: model.view.button_enabled(),
                        connect_clicked => AppMsg::ToggleConnection,
                    },

                    gtk::Label {
                        set_wrap: true,
                        #[watch]
                        set_label: &model.view.status_text(),
                    },

                    gtk::Box {
                        set_spacing: 8,
                        #[watch]
                        set_visible: model.view.needs_activation(),

                        gtk::Entry::with_buffer(&model.activation_code) {
                            set_hexpand: true,
                            set_placeholder_text: Some("Activation code"),
                            set_visibility: false,
                            connect_activate => AppMsg::Activate,
                        },

                        gtk::Button {
                            set_label: "Activate",
                            connect_clicked => AppMsg::Activate,
                        },
                    },

                    gtk::Label {
                        add_css_class: "error",
                        #[watch]
                        set_visible: model.view.prompt_error().is_some(),
                        #[watch]
                        set_label: model.view.prompt_error().unwrap_or_default(),
                    },
                },
            },
        }
    }

    fn init(
        _init: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let args = cli::get_args();
        let (engine, pump) = Engine::new(
            args.provider(),
            args.settings_store(),
            args.engine_config(),
        );
        let engine = Rc::new(engine);

        sender.oneshot_command(engine.poller());

        gtk::glib::timeout_add_local(
            PUMP_INTERVAL,
            gtk::glib::clone!(
                #[strong]
                sender,
                move || {
                    sender.input(AppMsg::Pump);
                    gtk::glib::ControlFlow::Continue
                }
            ),
        );

        root.connect_close_request(gtk::glib::clone!(
            #[strong]
            engine,
            move |_| {
                engine.shutdown();
                gtk::glib::Propagation::Proceed
            }
        ));

        let model = App {
            engine,
            pump,
            view: ViewState::default(),
            notifier: Notifier::default(),
            protocols: gtk::StringList::new(&[]),
            locations: gtk::StringList::new(&[]),
            chosen_location: None,
            activation_code: gtk::EntryBuffer::default(),
            syncing: Rc::default(),
        };

        let toast_overlay = model.notifier.overlay_widget();
        let widgets = view_output!();

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>) {
        match msg {
            AppMsg::Pump => {
                let before = self.view.phase();
                if self.pump.pump(&mut self.view) == 0 {
                    return;
                }

                self.sync_lists();
                for notice in self.view.take_notices() {
                    self.notifier.error(&notice);
                }
                if before == ConnectionPhase::Connecting
                    && self.view.phase() == ConnectionPhase::Connected
                {
                    self.notifier.info(&self.view.status_text());
                }
            }
            AppMsg::SelectProtocol(idx) => {
                let Some(protocol) = self.view.protocols().get(idx as usize) else {
                    return;
                };
                if self.view.protocol() != Some(protocol.as_str()) {
                    self.change_preference(Preference::Protocol(protocol.clone()), &sender);
                }
            }
            AppMsg::SelectNetworkLock(idx) => {
                let Some(lock) = NetworkLock::ALL.get(idx as usize).copied() else {
                    return;
                };
                if self.view.network_lock() != lock {
                    self.change_preference(Preference::NetworkLock(lock), &sender);
                }
            }
            AppMsg::SelectLocation(idx) => {
                let name = self
                    .view
                    .locations()
                    .get(idx as usize)
                    .map(|l| l.display_name.clone());
                if name.is_some() && name.as_deref() != self.location() {
                    self.chosen_location = name;
                }
            }
            AppMsg::ToggleConnection => {
                let coordinator = self.engine.coordinator();
                match self.view.phase() {
                    ConnectionPhase::Connected => sender.oneshot_command(async move {
                        if let Err(err) = coordinator.disconnect().await {
                            debug!("Disconnect failed: {err}");
                        }
                    }),
                    ConnectionPhase::Disconnected => {
                        let Some(location) = self.location().map(str::to_owned) else {
                            self.notifier.error("No location selected");
                            return;
                        };
                        sender.oneshot_command(async move {
                            if let Err(err) = coordinator.connect_to(&location).await {
                                debug!("Connect failed: {err}");
                            }
                        });
                    }
                    ConnectionPhase::Connecting | ConnectionPhase::Disconnecting => (),
                }
            }
            AppMsg::Activate => {
                let code = self.activation_code.text().to_string();
                self.activation_code.set_text("");
                let coordinator = self.engine.coordinator();
                sender.oneshot_command(async move {
                    if let Err(err) = coordinator.activate(&code).await {
                        debug!("Activation failed: {err}");
                    }
                });
            }
        }
    }
}

fn main() {
    if let Err(err) =
        expressvpn_gui::logger::init(*cli::get_log_level(), *cli::get_log_output())
    {
        eprintln!("Could not set up logging: {err:#}");
    }

    // Our flags are not meant for GTK.
    let app = RelmApp::new("relm4.ghaf.expressvpn-gui").with_args(Vec::new());
    app.run::<App>(());
}
